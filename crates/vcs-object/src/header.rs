use crate::{ObjectError, ObjectType};

/// Parse an object header from raw bytes.
///
/// The header is `"<type> <size>\0"`. Returns `(type, content_size,
/// header_length)` where `header_length` includes the NUL terminator.
pub fn parse_header(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("missing NUL terminator".into()))?;

    let header = &data[..nul];
    let space = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("missing space in header".into()))?;

    let obj_type = ObjectType::from_bytes(&header[..space])?;

    let size_str = std::str::from_utf8(&header[space + 1..])
        .map_err(|_| ObjectError::InvalidHeader("non-ASCII size".into()))?;
    if size_str.len() > 1 && size_str.starts_with('0') {
        return Err(ObjectError::InvalidHeader(format!(
            "size has leading zero: {size_str}"
        )));
    }
    let content_size: usize = size_str
        .parse()
        .map_err(|_| ObjectError::InvalidHeader(format!("invalid size: {size_str}")))?;

    Ok((obj_type, content_size, nul + 1))
}

/// Serialize an object header: `"<type> <size>\0"`.
pub fn write_header(obj_type: ObjectType, content_size: usize) -> Vec<u8> {
    format!("{obj_type} {content_size}\0").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_blob_header() {
        let data = b"blob 12\0hello world!";
        let (ty, size, hdr_len) = parse_header(data).unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(size, 12);
        assert_eq!(hdr_len, 8);
        assert_eq!(&data[hdr_len..], b"hello world!");
    }

    #[test]
    fn parse_zero_size() {
        let (ty, size, _) = parse_header(b"tree 0\0").unwrap();
        assert_eq!(ty, ObjectType::Tree);
        assert_eq!(size, 0);
    }

    #[test]
    fn write_parse_roundtrip() {
        for (ty, size) in [
            (ObjectType::Blob, 0),
            (ObjectType::Tree, 42),
            (ObjectType::Commit, 12345678),
            (ObjectType::Tag, 7),
        ] {
            let hdr = write_header(ty, size);
            let (pty, psize, plen) = parse_header(&hdr).unwrap();
            assert_eq!((pty, psize, plen), (ty, size, hdr.len()));
        }
    }

    #[test]
    fn malformed_headers_rejected() {
        assert!(parse_header(b"blob 12").is_err()); // no NUL
        assert!(parse_header(b"blob12\0").is_err()); // no space
        assert!(parse_header(b"sock 12\0").is_err()); // bad type
        assert!(parse_header(b"blob abc\0").is_err()); // bad size
        assert!(parse_header(b"blob 007\0").is_err()); // leading zero
        assert!(parse_header(b"blob -1\0").is_err()); // negative
    }
}
