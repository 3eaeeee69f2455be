//! Small adapters over SDK shapes
//!
//! Members the service model marks as required come back as plain values,
//! optional ones as `Option`s. These traits let adapters read both the same
//! way.

use nestor_cloud::TagMap;
use std::collections::HashMap;

pub(crate) trait Present<'a> {
    /// The value, if set and non-empty
    fn present(self) -> Option<&'a str>;
}

impl<'a> Present<'a> for &'a str {
    fn present(self) -> Option<&'a str> {
        Some(self).filter(|s| !s.is_empty())
    }
}

impl<'a> Present<'a> for Option<&'a str> {
    fn present(self) -> Option<&'a str> {
        self.filter(|s| !s.is_empty())
    }
}

pub(crate) trait TagsField {
    fn to_tag_map(self) -> TagMap;
}

impl TagsField for &HashMap<String, String> {
    fn to_tag_map(self) -> TagMap {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl TagsField for Option<&HashMap<String, String>> {
    fn to_tag_map(self) -> TagMap {
        self.map(|tags| tags.to_tag_map()).unwrap_or_default()
    }
}

/// Tags as the `HashMap` most SDK request builders take
pub(crate) fn tag_hash_map(tags: &TagMap) -> HashMap<String, String> {
    tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Last `/`-separated segment of an ARN (`arn:aws:iam::1:role/app-dev-worker` -> `app-dev-worker`)
pub(crate) fn arn_resource_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}
