// Read-through client for the vector icon API. Stateless, no cache: the
// provider already serves collection JSON from a CDN.
use anyhow::{anyhow, Result};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::IconsConfig;

/// Curated icon sets offered per item category.
pub const RECOMMENDED_ICONS: &[(&str, &str, &[&str])] = &[
    (
        "clothing",
        "Clothing",
        &[
            "mdi:tshirt-crew",
            "mdi:shoe-sneaker",
            "mdi:hat-fedora",
            "mdi:sunglasses",
            "heroicons:shopping-bag",
        ],
    ),
    (
        "electronics",
        "Electronics",
        &[
            "mdi:laptop",
            "mdi:cellphone",
            "mdi:headphones",
            "mdi:tablet",
            "lucide:smartphone",
        ],
    ),
    (
        "accessories",
        "Accessories",
        &[
            "mdi:bag-personal",
            "mdi:watch",
            "mdi:wallet",
            "heroicons:gift",
            "lucide:briefcase",
        ],
    ),
    (
        "household",
        "Household",
        &[
            "mdi:book-open-page-variant",
            "mdi:cup",
            "mdi:sofa",
            "heroicons:home",
            "lucide:lamp",
        ],
    ),
    (
        "sports",
        "Sports",
        &[
            "mdi:basketball",
            "mdi:soccer",
            "mdi:bike",
            "lucide:dumbbell",
            "heroicons:trophy",
        ],
    ),
    (
        "books",
        "Books",
        &[
            "mdi:book",
            "mdi:bookshelf",
            "heroicons:book-open",
            "lucide:book-open",
            "carbon:book",
        ],
    ),
];

#[derive(Debug, Clone)]
pub struct IconData {
    pub prefix: String,
    pub name: String,
    pub body: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SketchIcon {
    pub id: String,
    pub name: String,
    pub svg: String,
    pub keywords: Vec<String>,
    pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IconSearch {
    #[serde(default)]
    pub icons: Vec<String>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Clone)]
pub struct IconCatalog {
    http: Client,
    endpoint: String,
    collections: Vec<String>,
}

impl IconCatalog {
    pub fn new(http: Client, config: &IconsConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            collections: config.collections.clone(),
        }
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<IconSearch> {
        let response = self
            .http
            .get(format!("{}/search", self.endpoint))
            .query(&[
                ("query", query),
                ("limit", &limit.to_string()),
                ("prefixes", &self.collections.join(",")),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("icon search failed: {status}"));
        }
        Ok(response.json::<IconSearch>().await?)
    }

    /// Look up one icon's vector body. `Ok(None)` for unknown ids or
    /// malformed id strings, mirroring the provider's empty responses.
    pub async fn fetch_icon(&self, icon_id: &str) -> Result<Option<IconData>> {
        let Some((prefix, name)) = split_icon_id(icon_id) else {
            return Ok(None);
        };
        let response = self
            .http
            .get(format!("{}/{prefix}.json", self.endpoint))
            .query(&[("icons", name)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let data: Value = response.json().await?;
        let Some(icon) = data.get("icons").and_then(|icons| icons.get(name)) else {
            return Ok(None);
        };
        let Some(body) = icon.get("body").and_then(Value::as_str) else {
            return Ok(None);
        };
        let dimension = |key: &str| -> u32 {
            icon.get(key)
                .or_else(|| data.get(key))
                .and_then(Value::as_u64)
                .unwrap_or(24) as u32
        };
        Ok(Some(IconData {
            prefix: prefix.to_string(),
            name: name.to_string(),
            body: body.to_string(),
            width: dimension("width"),
            height: dimension("height"),
        }))
    }

    pub async fn sketch(&self, icon_id: &str) -> Result<Option<SketchIcon>> {
        Ok(self.fetch_icon(icon_id).await?.map(sketch_from_icon))
    }

    /// Resolve many icon ids concurrently. Individual failures are dropped;
    /// a partial result beats a failed page.
    pub async fn sketches(&self, icon_ids: &[String]) -> Vec<SketchIcon> {
        let lookups = icon_ids.iter().map(|id| self.sketch(id));
        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|result| result.ok().flatten())
            .collect()
    }
}

pub fn recommended_ids(category: Option<&str>) -> Vec<String> {
    if let Some(category) = category {
        if let Some((_, _, ids)) = RECOMMENDED_ICONS
            .iter()
            .find(|(name, _, _)| *name == category)
        {
            return ids.iter().map(|id| id.to_string()).collect();
        }
    }
    RECOMMENDED_ICONS
        .iter()
        .flat_map(|(_, _, ids)| ids.iter())
        .take(20)
        .map(|id| id.to_string())
        .collect()
}

fn split_icon_id(icon_id: &str) -> Option<(&str, &str)> {
    let (prefix, name) = icon_id.split_once(':')?;
    if prefix.is_empty() || name.is_empty() {
        return None;
    }
    Some((prefix, name))
}

fn sketch_from_icon(icon: IconData) -> SketchIcon {
    SketchIcon {
        id: format!("{}:{}", icon.prefix, icon.name),
        name: icon.name.replace('-', " "),
        svg: icon_to_svg(&icon),
        keywords: icon.name.split('-').map(str::to_string).collect(),
        collection: collection_name(&icon.prefix).to_string(),
    }
}

fn icon_to_svg(icon: &IconData) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">{body}</svg>",
        w = icon.width,
        h = icon.height,
        body = icon.body
    )
}

fn collection_name(prefix: &str) -> &str {
    match prefix {
        "mdi" => "Material Design Icons",
        "heroicons" => "Heroicons",
        "lucide" => "Lucide",
        "carbon" => "Carbon Design",
        "tabler" => "Tabler Icons",
        other => other,
    }
}
