use bstr::{BStr, BString, ByteSlice};
use vcs_hash::ObjectId;
use vcs_utils::date::Signature;

use crate::ObjectError;

/// A commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Id of the root tree.
    pub tree: ObjectId,
    /// Parent commit ids, in order; the first parent carries merge
    /// semantics. Empty for a root commit.
    pub parents: Vec<ObjectId>,
    /// Author identity and timestamp.
    pub author: Signature,
    /// Committer identity and timestamp.
    pub committer: Signature,
    /// Optional encoding header (e.g. "ISO-8859-1").
    pub encoding: Option<BString>,
    /// Optional GPG signature; multi-line, stored without the continuation
    /// prefixes.
    pub gpgsig: Option<BString>,
    /// Unknown headers, preserved in order for round-tripping.
    pub extra_headers: Vec<(BString, BString)>,
    /// Message: everything after the blank separator line.
    pub message: BString,
}

/// Split header lines off `data`, folding space-prefixed continuation lines
/// into the preceding header. Returns the headers and the offset where the
/// message starts.
fn split_headers(data: &[u8]) -> (Vec<(BString, BString)>, usize) {
    let mut headers: Vec<(BString, BString)> = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        if data[pos] == b'\n' {
            // Blank line: the message follows.
            pos += 1;
            break;
        }

        let line_end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| p + pos)
            .unwrap_or(data.len());
        let line = &data[pos..line_end];

        if line.first() == Some(&b' ') {
            // Continuation of the previous header.
            if let Some((_, value)) = headers.last_mut() {
                value.push(b'\n');
                value.extend_from_slice(&line[1..]);
            }
        } else if let Some(space) = line.iter().position(|&b| b == b' ') {
            headers.push((BString::from(&line[..space]), BString::from(&line[space + 1..])));
        } else {
            // A key with no value; keep it so nothing is silently dropped.
            headers.push((BString::from(line), BString::default()));
        }

        pos = if line_end < data.len() {
            line_end + 1
        } else {
            line_end
        };
    }

    (headers, pos)
}

fn parse_id(value: &[u8], what: &str) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader(format!("non-UTF-8 {what} id")))?;
    Ok(ObjectId::from_hex(hex)?)
}

fn parse_signature(value: &BStr) -> Result<Signature, ObjectError> {
    Signature::parse(value).map_err(|e| ObjectError::InvalidSignature(e.to_string()))
}

/// Append a possibly multi-line value with space-prefixed continuations.
fn push_folded(out: &mut Vec<u8>, value: &[u8]) {
    for (i, line) in value.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
            out.push(b' ');
        }
        out.extend_from_slice(line);
    }
    out.push(b'\n');
}

impl Commit {
    /// Parse commit content (no object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let (headers, message_start) = split_headers(content);

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut encoding = None;
        let mut gpgsig = None;
        let mut extra_headers = Vec::new();

        for (key, value) in headers {
            match key.as_bytes() {
                b"tree" => tree = Some(parse_id(&value, "tree")?),
                b"parent" => parents.push(parse_id(&value, "parent")?),
                b"author" => author = Some(parse_signature(value.as_bstr())?),
                b"committer" => committer = Some(parse_signature(value.as_bstr())?),
                b"encoding" => encoding = Some(value),
                b"gpgsig" => gpgsig = Some(value),
                _ => extra_headers.push((key, value)),
            }
        }

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitField { field: "author" })?,
            committer: committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?,
            encoding,
            gpgsig,
            extra_headers,
            message: BString::from(&content[message_start..]),
        })
    }

    /// Serialize commit content (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');

        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }

        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');

        if let Some(ref enc) = self.encoding {
            out.extend_from_slice(b"encoding ");
            out.extend_from_slice(enc);
            out.push(b'\n');
        }

        if let Some(ref sig) = self.gpgsig {
            out.extend_from_slice(b"gpgsig ");
            push_folded(&mut out, sig);
        }

        for (key, value) in &self.extra_headers {
            out.extend_from_slice(key);
            out.push(b' ');
            push_folded(&mut out, value);
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// The first parent, if any.
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// More than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// No parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// The first line of the message.
    pub fn summary(&self) -> &BStr {
        let msg: &[u8] = self.message.as_ref();
        match msg.find_byte(b'\n') {
            Some(pos) => BStr::new(&msg[..pos]),
            None => BStr::new(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        out.extend_from_slice(b"parent 0000000000000000000000000000000000000001\n");
        out.extend_from_slice(b"author Ada L <ada@example.com> 1700000000 +0100\n");
        out.extend_from_slice(b"committer Bob M <bob@example.com> 1700000100 -0500\n");
        out.extend_from_slice(b"\n");
        out.extend_from_slice(b"Add the thing\n\nLonger description.\n");
        out
    }

    #[test]
    fn parse_fields() {
        let commit = Commit::parse(&sample()).unwrap();
        assert_eq!(
            commit.tree.to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(commit.author.name, "Ada L");
        assert_eq!(commit.author.date.tz_offset, 60);
        assert_eq!(commit.committer.email, "bob@example.com");
        assert_eq!(commit.summary(), "Add the thing");
    }

    #[test]
    fn serialize_roundtrip_is_byte_exact() {
        let bytes = sample();
        let commit = Commit::parse(&bytes).unwrap();
        assert_eq!(commit.serialize_content(), bytes);
    }

    #[test]
    fn root_commit() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        bytes.extend_from_slice(b"author A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"committer A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"\ninitial\n");

        let commit = Commit::parse(&bytes).unwrap();
        assert!(commit.is_root());
        assert!(!commit.is_merge());
        assert_eq!(commit.first_parent(), None);
        assert_eq!(commit.serialize_content(), bytes);
    }

    #[test]
    fn merge_commit_keeps_parent_order() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        bytes.extend_from_slice(b"parent 0000000000000000000000000000000000000002\n");
        bytes.extend_from_slice(b"parent 0000000000000000000000000000000000000001\n");
        bytes.extend_from_slice(b"author A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"committer A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"\nmerge\n");

        let commit = Commit::parse(&bytes).unwrap();
        assert!(commit.is_merge());
        assert_eq!(
            commit.parents[0].to_hex(),
            "0000000000000000000000000000000000000002"
        );
        assert_eq!(commit.serialize_content(), bytes);
    }

    #[test]
    fn gpgsig_continuation_roundtrip() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        bytes.extend_from_slice(b"author A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"committer A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"gpgsig -----BEGIN PGP SIGNATURE-----\n");
        bytes.extend_from_slice(b" line2data\n");
        bytes.extend_from_slice(b" -----END PGP SIGNATURE-----\n");
        bytes.extend_from_slice(b"\nsigned\n");

        let commit = Commit::parse(&bytes).unwrap();
        let sig = commit.gpgsig.as_ref().unwrap();
        assert_eq!(
            sig.as_bytes(),
            b"-----BEGIN PGP SIGNATURE-----\nline2data\n-----END PGP SIGNATURE-----"
        );
        assert_eq!(commit.serialize_content(), bytes);
    }

    #[test]
    fn encoding_roundtrip() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        bytes.extend_from_slice(b"author A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"committer A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"encoding ISO-8859-1\n");
        bytes.extend_from_slice(b"\nmsg\n");

        let commit = Commit::parse(&bytes).unwrap();
        assert_eq!(commit.encoding.as_ref().unwrap(), "ISO-8859-1");
        assert_eq!(commit.serialize_content(), bytes);
    }

    #[test]
    fn unknown_headers_preserved() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        bytes.extend_from_slice(b"author A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"committer A <a@b.c> 1000000000 +0000\n");
        bytes.extend_from_slice(b"mergetag object abc\n with continuation\n");
        bytes.extend_from_slice(b"\nmsg\n");

        let commit = Commit::parse(&bytes).unwrap();
        assert_eq!(commit.extra_headers.len(), 1);
        assert_eq!(commit.extra_headers[0].0, "mergetag");
        assert_eq!(commit.serialize_content(), bytes);
    }

    #[test]
    fn missing_fields_rejected() {
        let no_tree =
            b"author A <a@b.c> 1 +0000\ncommitter A <a@b.c> 1 +0000\n\nmsg\n";
        assert!(matches!(
            Commit::parse(no_tree),
            Err(ObjectError::MissingCommitField { field: "tree" })
        ));

        let no_committer =
            b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\nauthor A <a@b.c> 1 +0000\n\nmsg\n";
        assert!(matches!(
            Commit::parse(no_committer),
            Err(ObjectError::MissingCommitField { field: "committer" })
        ));
    }

    #[test]
    fn empty_message() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        bytes.extend_from_slice(b"author A <a@b.c> 1 +0000\n");
        bytes.extend_from_slice(b"committer A <a@b.c> 1 +0000\n");
        bytes.extend_from_slice(b"\n");

        let commit = Commit::parse(&bytes).unwrap();
        assert!(commit.message.is_empty());
        assert_eq!(commit.serialize_content(), bytes);
    }
}
