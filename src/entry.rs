/// One logical record of the log.
///
/// The index is chosen by the caller; the log never invents indices, it only
/// persists them and hands them back on replay. The payload is opaque and may
/// be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub index: u64,
    pub payload: Vec<u8>,
}

impl Entry {
    pub fn new(index: u64, payload: impl Into<Vec<u8>>) -> Self {
        Entry {
            index,
            payload: payload.into(),
        }
    }

    /// Serialize to the frame body: 8-byte little-endian index, then the
    /// payload bytes verbatim.
    pub(crate) fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.payload.len());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Deserialize from a frame body. A body shorter than the index field
    /// is invalid.
    pub(crate) fn unmarshal(body: &[u8]) -> Option<Self> {
        if body.len() < 8 {
            return None;
        }
        let index = u64::from_le_bytes(body[..8].try_into().unwrap());
        Some(Entry {
            index,
            payload: body[8..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal_roundtrip() {
        let entry = Entry::new(42, b"hello".to_vec());
        let body = entry.marshal();
        assert_eq!(body.len(), 8 + 5);
        assert_eq!(&body[..8], &42u64.to_le_bytes());
        assert_eq!(&body[8..], b"hello");

        let back = Entry::unmarshal(&body).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_empty_payload() {
        let entry = Entry::new(7, Vec::new());
        let body = entry.marshal();
        assert_eq!(body.len(), 8);

        let back = Entry::unmarshal(&body).unwrap();
        assert_eq!(back.index, 7);
        assert!(back.payload.is_empty());
    }

    #[test]
    fn test_short_body_rejected() {
        assert!(Entry::unmarshal(&[]).is_none());
        assert!(Entry::unmarshal(&[1, 2, 3, 4, 5, 6, 7]).is_none());
    }

    #[test]
    fn test_payload_preserved_exactly() {
        let payload: Vec<u8> = (0..=255).collect();
        let entry = Entry::new(u64::MAX, payload.clone());
        let back = Entry::unmarshal(&entry.marshal()).unwrap();
        assert_eq!(back.index, u64::MAX);
        assert_eq!(back.payload, payload);
    }
}
