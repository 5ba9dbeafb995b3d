pub mod core;
pub mod index;
pub mod query;
pub mod compression;
pub mod maintenance;

pub use crate::core::config::{ManagerConfig, OverlapPolicy, StoreConfig};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::event::{DataEvent, EventType, ManagerEvent};
pub use crate::core::manager::{BulkReport, DataManager, StoreHandle};
pub use crate::core::store::{DataStore, StoreSnapshot};
pub use crate::core::types::{StoreType, Value};
pub use crate::index::data_index::IndexOptions;
pub use crate::query::ast::{Logic, Operator, Query, SortDirection};
pub use crate::query::executor::QueryResults;

/*
┌──────────────────────────────────────────────────────────────────────────────────────┐
│                                 KVDEX STRUCT ARCHITECTURE                            │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── MANAGER LAYER ───────────────────────────────────┐
│                                                                                      │
│  ┌────────────────────────────────────────────────────────────────────────────────┐  │
│  │                              struct DataManager                                │  │
│  │  ┌──────────────────────────────────────────────────────────────────────────┐  │  │
│  │  │ config: ManagerConfig                 // Limits, intervals, codec      │  │  │
│  │  │ codec: BackupCodec                    // Framed backup payloads        │  │  │
│  │  │ stores: RwLock<BTreeMap<String, StoreHandle>>                           │  │  │
│  │  │ default_store: RwLock<Option<String>>                                   │  │  │
│  │  │ backups: RwLock<HashMap<String, Vec<u8>>>                               │  │  │
│  │  │ listeners: RwLock<Vec<ListenerEntry>> // on/off/emit bus               │  │  │
│  │  │ events: Mutex<EventLog<ManagerEvent>> // Bounded ring buffer           │  │  │
│  │  │ scheduler: Mutex<Option<MaintenanceScheduler>>                          │  │  │
│  │  │ cancel: CancellationToken             // Stops timers and bulk runs    │  │  │
│  │  └──────────────────────────────────────────────────────────────────────────┘  │  │
│  └────────────────────────────────────────────────────────────────────────────────┘  │
│                                                                                      │
│  ┌────────────────────────┐  ┌────────────────────────┐  ┌────────────────────────┐  │
│  │ struct BulkReport      │  │ struct Maintenance-    │  │ struct TaskStats       │  │
│  │ • succeeded / failed   │  │        Scheduler       │  │ • runs / failures      │  │
│  │ • skipped / cancelled  │  │ • one interval loop    │  │ • skipped_overlaps     │  │
│  │ • validations          │  │   per task             │  │ • last_error           │  │
│  └────────────────────────┘  └────────────────────────┘  └────────────────────────┘  │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────── STORE LAYER ────────────────────────────────────┐
│                                                                                      │
│  ┌────────────────────────────────────────────────────────────────────────────────┐  │
│  │                               struct DataStore                                 │  │
│  │  ┌──────────────────────────────────────────────────────────────────────────┐  │  │
│  │  │ data: HashMap<String, Record>         // Value + insertion seq          │  │  │
│  │  │ order: BTreeMap<u64, String>          // Insertion order                │  │  │
│  │  │ indexes: BTreeMap<String, DataIndex>  // Secondary indexes              │  │  │
│  │  │ cache: QueryCache                     // TTL result cache               │  │  │
│  │  │ queries: BTreeMap<String, Query>      // Named queries                  │  │  │
│  │  │ subscriptions: SubscriptionRegistry   // Exact-key callbacks            │  │  │
│  │  │ events: EventLog<DataEvent>           // Bounded ring buffer            │  │  │
│  │  │ validators: Vec<Box<dyn RecordValidator>>                               │  │  │
│  │  │ backend: Option<Arc<dyn SyncBackend>>                                   │  │  │
│  │  └──────────────────────────────────────────────────────────────────────────┘  │  │
│  └────────────────────────────────────────────────────────────────────────────────┘  │
│                                                                                      │
│  ┌────────────────────────┐  ┌────────────────────────┐  ┌────────────────────────┐  │
│  │ struct DataIndex       │  │ struct QueryCache      │  │ struct StoreSnapshot   │  │
│  │ • fields: Vec<String>  │  │ • cache: LruCache      │  │ • data: Map            │  │
│  │ • buckets: BTreeMap<   │  │ • size_limit: usize    │  │ • indexes: Vec<Index-  │  │
│  │   String, BTreeSet>    │  │ • hit_count / miss     │  │   Snapshot>            │  │
│  └────────────────────────┘  └────────────────────────┘  └────────────────────────┘  │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────── QUERY LAYER ────────────────────────────────────┐
│                                                                                      │
│  ┌────────────────────────┐  ┌────────────────────────┐  ┌────────────────────────┐  │
│  │ struct Query           │  │ struct ConditionMatcher│  │ struct QueryPlanner    │  │
│  │ • conditions           │  │ • left-fold AND/OR/NOT │  │ • CostModel            │  │
│  │ • fields / sort        │  │ • precompiled regexes  │  │ • LogicalPlan          │  │
│  │ • limit / offset       │  └────────────────────────┘  │ • explain() only       │  │
│  │ • cache: CachePolicy   │                              └────────────────────────┘  │
│  └────────────────────────┘                                                          │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── RELATIONSHIPS ───────────────────────────────────┐
│                                                                                      │
│  DataManager ──owns──> StoreHandle ──locks──> DataStore                              │
│     │                                                                                │
│     ├──owns──> MaintenanceScheduler ──ticks──> sync/backup/optimize/compact/validate │
│     │                                                                                │
│     └──encodes──> StoreSnapshot ──via──> BackupCodec (none / lz4 / zstd + crc32)     │
│                                                                                      │
│  DataStore ──query──> QueryExecutor ──filters_with──> ConditionMatcher               │
│     │                      │                                                         │
│     │                      └──memoized_in──> QueryCache                              │
│     │                                                                                │
│     ├──explain──> QueryPlanner ──reads──> DataIndex bucket sizes                     │
│     │                                                                                │
│     └──set/delete──> SubscriptionRegistry ──calls──> Callback                        │
│                                                                                      │
└──────────────────────────────────────────────────────────────────────────────────────┘
*/
