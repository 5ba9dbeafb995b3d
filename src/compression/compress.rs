use crate::core::error::{Error, ErrorKind, Result};
use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;

const MAGIC: &[u8; 4] = b"KVDX";
const FORMAT_VERSION: u8 = 1;
// magic + version + codec tag + crc32
const HEADER_LEN: usize = 4 + 1 + 1 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Lz4,         // Fast, ratio 2-3x
    Zstd(i32),   // Better ratio, level 1..=22
}

impl CompressionType {
    /// Maps manager settings onto a codec: off -> None, level 0 -> LZ4,
    /// any other level -> zstd at that level.
    pub fn from_settings(enabled: bool, level: i32) -> Self {
        match (enabled, level) {
            (false, _) => CompressionType::None,
            (true, 0) => CompressionType::Lz4,
            (true, level) => CompressionType::Zstd(level.clamp(1, 22)),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lz4 => 1,
            CompressionType::Zstd(_) => 2,
        }
    }
}

/// Compressed block storage for general purpose data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedBlock {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compression: CompressionType,
}

impl CompressedBlock {
    pub fn compress(data: &[u8], compression: CompressionType) -> Result<Self> {
        let compressed = match compression {
            CompressionType::None => data.to_vec(),

            CompressionType::Lz4 => lz4_flex::compress_prepend_size(data),

            CompressionType::Zstd(level) => zstd::encode_all(data, level)
                .map_err(|e| Error::new(ErrorKind::Compression, e.to_string()))?,
        };

        Ok(CompressedBlock {
            data: compressed,
            original_size: data.len(),
            compression,
        })
    }

    pub fn decompress(&self) -> Result<Vec<u8>> {
        decompress_with(self.compression.tag(), &self.data)
    }
}

fn decompress_with(tag: u8, data: &[u8]) -> Result<Vec<u8>> {
    match tag {
        0 => Ok(data.to_vec()),

        1 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::new(ErrorKind::Compression, e.to_string())),

        2 => zstd::decode_all(data)
            .map_err(|e| Error::new(ErrorKind::Compression, e.to_string())),

        other => Err(Error::new(
            ErrorKind::Compression,
            format!("unknown codec tag {}", other),
        )),
    }
}

/// Frames serialized snapshots for backup storage:
/// `KVDX | version | codec | crc32(plain) | payload`.
#[derive(Debug, Clone, Copy)]
pub struct BackupCodec {
    pub compression: CompressionType,
}

impl BackupCodec {
    pub fn new(compression: CompressionType) -> Self {
        BackupCodec { compression }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let plain = serde_json::to_vec(value)?;
        let checksum = crc32fast::hash(&plain);
        let block = CompressedBlock::compress(&plain, self.compression)?;

        let mut out = Vec::with_capacity(HEADER_LEN + block.data.len());
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.push(self.compression.tag());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&block.data);
        Ok(out)
    }

    /// Decodes any frame regardless of the codec this instance writes with.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(Error::new(ErrorKind::Serialization, "not a backup frame"));
        }
        if bytes[4] != FORMAT_VERSION {
            return Err(Error::new(
                ErrorKind::Serialization,
                format!("unsupported backup format version {}", bytes[4]),
            ));
        }

        let tag = bytes[5];
        let expected = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let plain = decompress_with(tag, &bytes[HEADER_LEN..])?;

        let actual = crc32fast::hash(&plain);
        if actual != expected {
            return Err(Error::new(
                ErrorKind::Checksum,
                format!("checksum mismatch: expected {:08x}, got {:08x}", expected, actual),
            ));
        }

        Ok(serde_json::from_slice(&plain)?)
    }
}

impl Default for BackupCodec {
    fn default() -> Self {
        BackupCodec::new(CompressionType::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn payload() -> Value {
        json!({"data": {"score:alice": 120, "notes": "x".repeat(512)}})
    }

    #[test]
    fn frames_round_trip_for_every_codec() {
        for compression in [CompressionType::None, CompressionType::Lz4, CompressionType::Zstd(3)] {
            let codec = BackupCodec::new(compression);
            let bytes = codec.encode(&payload()).unwrap();
            let decoded: Value = BackupCodec::default().decode(&bytes).unwrap();
            assert_eq!(decoded, payload(), "codec {:?}", compression);
        }
    }

    #[test]
    fn compression_shrinks_repetitive_payloads() {
        let plain = BackupCodec::new(CompressionType::None).encode(&payload()).unwrap();
        let packed = BackupCodec::new(CompressionType::Lz4).encode(&payload()).unwrap();
        assert!(packed.len() < plain.len());
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let codec = BackupCodec::new(CompressionType::None);
        let mut bytes = codec.encode(&payload()).unwrap();
        let last = bytes.len() - 3;
        bytes[last] ^= b'z' ^ b'y';
        let err = codec.decode::<Value>(&bytes).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Checksum | ErrorKind::Serialization));
    }

    #[test]
    fn rejects_foreign_bytes() {
        let err = BackupCodec::default().decode::<Value>(b"{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn settings_map_to_codecs() {
        assert_eq!(CompressionType::from_settings(false, 9), CompressionType::None);
        assert_eq!(CompressionType::from_settings(true, 0), CompressionType::Lz4);
        assert_eq!(CompressionType::from_settings(true, 30), CompressionType::Zstd(22));
    }
}
