//! Types exchanged with the catalog server.

use serde_json::Value;

use crate::error::CatalogClientError;

/// A record or request payload as an unstructured JSON object.
pub type Metadata = serde_json::Map<String, Value>;

/// Selects a record either by its server assigned `mongo_id`
/// or by its caller assigned `uid`.
///
/// Exactly one of the two has to be set,
/// operations reject selectors with both or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRef {
    pub mongo_id: Option<String>,
    pub uid: Option<String>,
}

impl FileRef {
    pub fn mongo_id(mongo_id: impl Into<String>) -> Self {
        Self {
            mongo_id: Some(mongo_id.into()),
            uid: None,
        }
    }

    pub fn uid(uid: impl Into<String>) -> Self {
        Self {
            mongo_id: None,
            uid: Some(uid.into()),
        }
    }
}

/// Identifier of a record after validating a [FileRef].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selector<'a> {
    MongoId(&'a str),
    Uid(&'a str),
}

impl<'a> TryFrom<&'a FileRef> for Selector<'a> {
    type Error = CatalogClientError;

    fn try_from(file: &'a FileRef) -> Result<Self, Self::Error> {
        match (&file.mongo_id, &file.uid) {
            (Some(mongo_id), None) => Ok(Selector::MongoId(mongo_id)),
            (None, Some(uid)) => Ok(Selector::Uid(uid)),
            (None, None) => Err(CatalogClientError::InvalidArgument(
                "either `mongo_id` or `uid` has to be specified".to_string(),
            )),
            (Some(_), Some(_)) => Err(CatalogClientError::InvalidArgument(
                "the query is ambiguous, do not specify `mongo_id` and `uid` at the same time"
                    .to_string(),
            )),
        }
    }
}

/// Borrowed view of a `GET /files` response.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FileList<'a> {
    files: &'a [Value],
}

impl<'a> FileList<'a> {
    /// `None` if the page has no `_embedded.files` array.
    pub fn from_page(page: &'a Metadata) -> Option<Self> {
        let files = page
            .get("_embedded")
            .and_then(|embedded| embedded.get("files"))
            .and_then(Value::as_array)?;
        Some(Self { files })
    }

    /// `(uid, mongo_id)` of every entry carrying both as strings.
    /// Other entries are skipped.
    pub fn id_pairs(self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.files.iter().filter_map(|entry| {
            let uid = entry.get("uid").and_then(Value::as_str)?;
            let mongo_id = entry.get("mongo_id").and_then(Value::as_str)?;
            Some((uid, mongo_id))
        })
    }
}

/// Borrowed view of a `201 Created` response to `POST /files`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CreatedFile<'a> {
    /// Path of the new resource, e.g. `/api/files/<mongo_id>`.
    pub file: &'a str,
}

impl<'a> CreatedFile<'a> {
    /// `None` if the body has no string `file` field.
    pub fn from_body(body: &'a Metadata) -> Option<Self> {
        let file = body.get("file").and_then(Value::as_str)?;
        Some(Self { file })
    }

    /// The last path segment of [Self::file].
    pub fn mongo_id(&self) -> Option<&'a str> {
        self.file
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn selector_requires_exactly_one_identifier() {
        assert_eq!(
            Selector::try_from(&FileRef::mongo_id("m1")).unwrap(),
            Selector::MongoId("m1")
        );
        assert_eq!(
            Selector::try_from(&FileRef::uid("abc")).unwrap(),
            Selector::Uid("abc")
        );

        let both = FileRef {
            mongo_id: Some("m1".to_string()),
            uid: Some("abc".to_string()),
        };
        assert!(matches!(
            Selector::try_from(&both),
            Err(CatalogClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            Selector::try_from(&FileRef::default()),
            Err(CatalogClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn created_file_mongo_id_is_basename() {
        let body = metadata(json!({ "_links": {}, "file": "/api/files/m2" }));
        let created = CreatedFile::from_body(&body).unwrap();
        assert_eq!(created.mongo_id(), Some("m2"));

        for (file, expected) in [
            ("/api/files/m3/", Some("m3")),
            ("m4", Some("m4")),
            ("/", None),
        ] {
            assert_eq!(CreatedFile { file }.mongo_id(), expected);
        }
    }

    #[test]
    fn created_file_requires_file_string() {
        assert!(CreatedFile::from_body(&metadata(json!({ "ok": true }))).is_none());
        assert!(CreatedFile::from_body(&metadata(json!({ "file": 7 }))).is_none());
    }

    #[test]
    fn file_list_skips_incomplete_entries() {
        let page = metadata(json!({
            "_links": { "self": { "href": "/api/files" } },
            "_embedded": { "files": [
                { "uid": "a", "mongo_id": "m1", "file_size": 1 },
                { "mongo_id": "m2" },
                { "uid": "c" },
                { "uid": 5, "mongo_id": "m4" },
                { "uid": "e", "mongo_id": { "$oid": "m5" } },
                "not a record",
                { "uid": "f", "mongo_id": "m6" },
            ]},
        }));

        let pairs = FileList::from_page(&page)
            .unwrap()
            .id_pairs()
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![("a", "m1"), ("f", "m6")]);
    }

    #[test]
    fn file_list_requires_embedded_files() {
        for page in [
            json!({ "files": [] }),
            json!({ "_embedded": {} }),
            json!({ "_embedded": { "files": {} } }),
        ] {
            assert!(FileList::from_page(&metadata(page)).is_none());
        }
    }

    fn metadata(value: Value) -> Metadata {
        match value {
            Value::Object(object) => object,
            other => panic!("expected an object, found {other}"),
        }
    }
}
