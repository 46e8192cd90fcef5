use byteorder::{ByteOrder, LittleEndian};
use relite_primitives::{Lsn, TxId};

use crate::error::WalError;

/// §4.6's WAL record kind tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WalType {
    Insert = 1,
    Update = 2,
    Delete = 3,
    Commit = 4,
    Rollback = 5,
    Checkpoint = 6,
}

impl WalType {
    fn from_tag(tag: u8) -> Option<WalType> {
        Some(match tag {
            1 => WalType::Insert,
            2 => WalType::Update,
            3 => WalType::Delete,
            4 => WalType::Commit,
            5 => WalType::Rollback,
            6 => WalType::Checkpoint,
            _ => return None,
        })
    }
}

/// A single WAL record: `{ lsn, txnId, type, data, checksum }` (§4.6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub lsn: Lsn,
    pub txn_id: TxId,
    pub kind: WalType,
    pub data: Vec<u8>,
}

const HEADER_LEN: usize = 8 + 8 + 1;
const CHECKSUM_LEN: usize = 4;

impl Record {
    /// Serializes the record to its on-disk payload (without the leading
    /// length prefix, which the log writer adds).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len() + CHECKSUM_LEN);
        let mut header = [0u8; HEADER_LEN];
        LittleEndian::write_u64(&mut header[0..8], self.lsn.0);
        LittleEndian::write_u64(&mut header[8..16], self.txn_id.0);
        header[16] = self.kind as u8;
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&self.data);
        let checksum = crc32c::crc32c(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Decodes a payload previously produced by [`Record::encode`], verifying
    /// its checksum. `offset` is only used to annotate errors.
    pub fn decode(payload: &[u8], offset: u64) -> Result<Record, WalError> {
        if payload.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(WalError::ShortRead { expected: HEADER_LEN + CHECKSUM_LEN, found: payload.len() });
        }
        let body_len = payload.len() - CHECKSUM_LEN;
        let checksum = LittleEndian::read_u32(&payload[body_len..]);
        if crc32c::crc32c(&payload[..body_len]) != checksum {
            return Err(WalError::ChecksumMismatch { offset });
        }
        let lsn = Lsn(LittleEndian::read_u64(&payload[0..8]));
        let txn_id = TxId(LittleEndian::read_u64(&payload[8..16]));
        let tag = payload[16];
        let kind = WalType::from_tag(tag).ok_or(WalError::UnknownRecordType { offset, tag })?;
        let data = payload[HEADER_LEN..body_len].to_vec();
        Ok(Record { lsn, txn_id, kind, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let record = Record { lsn: Lsn(7), txn_id: TxId(3), kind: WalType::Insert, data: b"hello".to_vec() };
        let encoded = record.encode();
        let decoded = Record::decode(&encoded, 0).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn detects_corruption() {
        let record = Record { lsn: Lsn(1), txn_id: TxId(1), kind: WalType::Commit, data: vec![] };
        let mut encoded = record.encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;
        assert!(matches!(Record::decode(&encoded, 0), Err(WalError::ChecksumMismatch { .. })));
    }
}
