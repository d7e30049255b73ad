//! Response classification.

use drizzle_core::Error;

use crate::protocol::reader::{NULL_MARKER, PacketReader};
use crate::protocol::{EofPacket, ErrPacket, OkPacket, unknown_response};

/// One server response packet, by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(OkPacket),
    Error(ErrPacket),
    Eof(EofPacket),
    /// A result set follows with this many column definitions.
    ResultSetHeader { column_count: u64 },
}

impl Response {
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof(_))
    }
}

/// True if `payload` has the EOF shape: 0xFE and shorter than 9 bytes.
///
/// Longer 0xFE payloads are length-encoded integers or row data.
pub fn is_eof_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&0xFE) && payload.len() < 9
}

/// Classify and decode a response payload.
pub fn classify(payload: &[u8]) -> Result<Response, Error> {
    let Some(&first) = payload.first() else {
        return Err(unknown_response(payload));
    };

    let mut reader = PacketReader::new(payload);
    match first {
        0x00 => reader.parse_ok_packet().map(Response::Ok),
        0xFF => reader.parse_err_packet().map(Response::Error),
        0xFE if payload.len() < 9 => reader.parse_eof_packet().map(Response::Eof),
        NULL_MARKER => Err(unknown_response(payload)),
        _ => {
            let column_count = reader
                .read_lenenc_int()
                .map_err(|_| unknown_response(payload))?;
            if !reader.is_empty() {
                return Err(unknown_response(payload));
            }
            Ok(Response::ResultSetHeader { column_count })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drizzle_core::error::ProtocolErrorKind;

    #[test]
    fn test_classify_ok() {
        let response = classify(&[0x00, 0x05, 0x07, 0x02, 0x00, 0x01, 0x00]).unwrap();
        let Response::Ok(ok) = response else {
            panic!("expected OK, got {response:?}");
        };
        assert_eq!(ok.affected_rows, 5);
        assert_eq!(ok.last_insert_id, 7);
        assert_eq!(ok.warnings, 1);
    }

    #[test]
    fn test_classify_error() {
        let mut payload = vec![0xFF, 0x7A, 0x04, b'#'];
        payload.extend_from_slice(b"42S02Table 'x' doesn't exist");
        let Response::Error(err) = classify(&payload).unwrap() else {
            panic!("expected ERR");
        };
        assert_eq!(err.error_code, 1146);
        assert_eq!(err.sql_state, "42S02");
        assert_eq!(err.error_message, "Table 'x' doesn't exist");
    }

    #[test]
    fn test_classify_eof() {
        let response = classify(&[0xFE, 0x00, 0x00, 0x22, 0x00]).unwrap();
        assert!(response.is_eof());
        assert!(is_eof_packet(&[0xFE]));
        assert!(!is_eof_packet(&[0xFE; 9]));
    }

    #[test]
    fn test_classify_column_count() {
        assert_eq!(
            classify(&[0x03]).unwrap(),
            Response::ResultSetHeader { column_count: 3 }
        );
        assert_eq!(
            classify(&[0xFC, 0x2C, 0x01]).unwrap(),
            Response::ResultSetHeader { column_count: 300 }
        );
    }

    #[test]
    fn test_every_leading_byte_is_classified() {
        for first in 0x01..=0xFAu8 {
            assert_eq!(
                classify(&[first]).unwrap(),
                Response::ResultSetHeader {
                    column_count: u64::from(first)
                }
            );
        }
    }

    #[test]
    fn test_classify_unknown() {
        for payload in [&[][..], &[0xFB, b'/', b't'][..], &[0x02, 0x00][..], &[0xFD, 0x01][..]] {
            let err = classify(payload).unwrap_err();
            assert_eq!(
                err.protocol_kind(),
                Some(ProtocolErrorKind::UnknownResponse),
                "payload {payload:?}"
            );
        }
    }

    #[test]
    fn test_truncated_ok_is_protocol_error() {
        let err = classify(&[0x00, 0x01]).unwrap_err();
        assert_eq!(err.protocol_kind(), Some(ProtocolErrorKind::Truncated));
    }
}
