pub mod data_index;
