//! Lenient models of the STAC-like responses returned by the catalogue.
//!
//! Servers in the wild omit many fields the STAC standard marks as required, so
//! everything here is optional or defaults to empty.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const COLLECTION_REL: &str = "collection";
const NEXT_REL: &str = "next";
const DATETIME: &str = "datetime";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
pub struct CatalogItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Identifier of the owning collection. Some servers send it as a number.
    #[serde(
        default,
        deserialize_with = "collection_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub collection: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Keyed by role name, in the order the server listed them.
    #[serde(default, with = "ordered_assets")]
    pub assets: Vec<(String, Asset)>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl CatalogItem {
    /// Display title of the parent collection, taken from the first `collection` link.
    ///
    /// This title, not the collection id, names the output directory; two
    /// collections sharing a title will share a directory.
    pub fn collection_title(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == COLLECTION_REL)
            .and_then(|link| link.title.as_deref())
    }

    /// Year and month of acquisition (`"2023-04"`), from the first 7 characters of `datetime`.
    pub fn acquisition_period(&self) -> Option<&str> {
        self.properties
            .get(DATETIME)
            .and_then(Value::as_str)
            .and_then(|datetime| datetime.get(..7))
    }
}

/// One page of `/search` results.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct SearchPage {
    #[serde(default)]
    pub features: Vec<CatalogItem>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(rename = "numberMatched", default)]
    pub number_matched: Option<u64>,
}

impl SearchPage {
    pub fn next_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == NEXT_REL)
            .map(|link| link.href.as_str())
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct CollectionSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl CollectionSummary {
    pub fn describe(&self) -> String {
        match &self.title {
            Some(title) => format!("{} {}", self.id, title),
            None => self.id.clone(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct CollectionsPage {
    #[serde(default)]
    pub collections: Vec<CollectionSummary>,
}

fn collection_id<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<RawId>::deserialize(d)?.map(|raw| match raw {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    }))
}

mod ordered_assets {
    use super::Asset;
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(assets: &[(String, Asset)], s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(assets.iter().map(|(role, asset)| (role, asset)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<(String, Asset)>, D::Error> {
        struct AssetsVisitor;

        impl<'de> Visitor<'de> for AssetsVisitor {
            type Value = Vec<(String, Asset)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of asset role names to assets")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut assets = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    assets.push(entry);
                }
                Ok(assets)
            }
        }

        d.deserialize_map(AssetsVisitor)
    }
}
