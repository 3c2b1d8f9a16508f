use bstr::{BStr, BString, ByteSlice};
use vcs_hash::ObjectId;
use vcs_utils::date::Signature;

use crate::{ObjectError, ObjectType};

/// An annotated tag object.
///
/// Lightweight tags are just refs and never reach this codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Id of the tagged object.
    pub target: ObjectId,
    /// Kind of the tagged object.
    pub target_type: ObjectType,
    /// Tag name.
    pub name: BString,
    /// Tagger identity; optional in very old tags.
    pub tagger: Option<Signature>,
    /// Tag message.
    pub message: BString,
}

impl Tag {
    /// Parse tag content (no object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut target = None;
        let mut target_type = None;
        let mut name = None;
        let mut tagger = None;

        let mut pos = 0;
        while pos < content.len() {
            if content[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = content[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];

            if let Some(space) = line.iter().position(|&b| b == b' ') {
                let (key, value) = (&line[..space], &line[space + 1..]);
                match key {
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::InvalidHeader("non-UTF-8 target id".into())
                        })?;
                        target = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => target_type = Some(ObjectType::from_bytes(value)?),
                    b"tag" => name = Some(BString::from(value)),
                    b"tagger" => {
                        tagger = Some(
                            Signature::parse(BStr::new(value))
                                .map_err(|e| ObjectError::InvalidSignature(e.to_string()))?,
                        );
                    }
                    _ => {} // Unknown tag headers are ignored.
                }
            }

            pos = line_end + 1;
        }

        Ok(Self {
            target: target.ok_or(ObjectError::MissingTagField { field: "object" })?,
            target_type: target_type.ok_or(ObjectError::MissingTagField { field: "type" })?,
            name: name.ok_or(ObjectError::MissingTagField { field: "tag" })?,
            tagger,
            message: BString::from(&content[pos..]),
        })
    }

    /// Serialize tag content (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.target.to_hex().as_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_type.as_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');

        if let Some(ref tagger) = self.tagger {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(&tagger.to_bytes());
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// Whether this tag points at another tag (a tag chain).
    pub fn points_at_tag(&self) -> bool {
        self.target_type == ObjectType::Tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object 0000000000000000000000000000000000000042\n");
        out.extend_from_slice(b"type commit\n");
        out.extend_from_slice(b"tag v1.0.0\n");
        out.extend_from_slice(b"tagger Rel Eng <rel@example.com> 1700000000 +0000\n");
        out.extend_from_slice(b"\nRelease 1.0.0\n");
        out
    }

    #[test]
    fn parse_fields() {
        let tag = Tag::parse(&sample()).unwrap();
        assert_eq!(
            tag.target.to_hex(),
            "0000000000000000000000000000000000000042"
        );
        assert_eq!(tag.target_type, ObjectType::Commit);
        assert_eq!(tag.name, "v1.0.0");
        assert_eq!(tag.tagger.as_ref().unwrap().email, "rel@example.com");
        assert_eq!(tag.message, "Release 1.0.0\n");
        assert!(!tag.points_at_tag());
    }

    #[test]
    fn serialize_roundtrip() {
        let bytes = sample();
        let tag = Tag::parse(&bytes).unwrap();
        assert_eq!(tag.serialize_content(), bytes);
    }

    #[test]
    fn tagger_is_optional() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"object 0000000000000000000000000000000000000042\n");
        bytes.extend_from_slice(b"type blob\n");
        bytes.extend_from_slice(b"tag old-style\n");
        bytes.extend_from_slice(b"\nno tagger\n");

        let tag = Tag::parse(&bytes).unwrap();
        assert!(tag.tagger.is_none());
        assert_eq!(tag.serialize_content(), bytes);
    }

    #[test]
    fn tag_pointing_at_tag() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"object 0000000000000000000000000000000000000042\n");
        bytes.extend_from_slice(b"type tag\n");
        bytes.extend_from_slice(b"tag nested\n");
        bytes.extend_from_slice(b"\nchain\n");
        assert!(Tag::parse(&bytes).unwrap().points_at_tag());
    }

    #[test]
    fn missing_fields_rejected() {
        assert!(matches!(
            Tag::parse(b"type commit\ntag x\n\nmsg\n"),
            Err(ObjectError::MissingTagField { field: "object" })
        ));
        assert!(matches!(
            Tag::parse(b"object 0000000000000000000000000000000000000042\ntag x\n\nmsg\n"),
            Err(ObjectError::MissingTagField { field: "type" })
        ));
    }
}
