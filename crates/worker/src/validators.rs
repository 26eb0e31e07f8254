use weekpack_core::{PageMetadata, PageRequest};

/// Per-URL validator set after merging the client's hint with stored
/// metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub text_hash: Option<String>,
}

/// The client-supplied value wins field-by-field; stored metadata is the
/// fallback when the client sent nothing for that field.
pub fn merge_validators(meta: Option<&PageMetadata>, page: &PageRequest) -> MergedValidators {
    MergedValidators {
        etag: page
            .etag
            .clone()
            .or_else(|| meta.and_then(|m| m.etag.clone())),
        last_modified: page
            .last_modified
            .clone()
            .or_else(|| meta.and_then(|m| m.last_modified.clone())),
        text_hash: page
            .last_text_hash
            .clone()
            .or_else(|| meta.and_then(|m| m.text_hash.clone())),
    }
}
