use serde::{Deserialize, Serialize};
use std::fmt;

/// One playable-or-not URL considered for playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub label: String,
    /// Always absolute http(s); unique within a candidate list.
    pub url: String,
}

/// Language/quality track grouping servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sub,
    Dub,
    Raw,
}

impl Category {
    /// Fixed order used for defaults and automatic traversal.
    pub const PRIORITY: [Category; 3] = [Category::Sub, Category::Dub, Category::Raw];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Sub => "sub",
            Category::Dub => "dub",
            Category::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sub" | "softsub" | "hardsub" => Some(Category::Sub),
            "dub" => Some(Category::Dub),
            "raw" => Some(Category::Raw),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::parse(s).ok_or_else(|| anyhow::anyhow!("unknown category {s:?} (sub, dub, raw)"))
    }
}

/// An upstream delivery endpoint within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: String,
    pub name: String,
}

/// Servers grouped per category, as returned by the episode-server lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerBuckets {
    pub sub: Vec<ServerDescriptor>,
    pub dub: Vec<ServerDescriptor>,
    pub raw: Vec<ServerDescriptor>,
}

impl ServerBuckets {
    pub fn get(&self, category: Category) -> &[ServerDescriptor] {
        match category {
            Category::Sub => &self.sub,
            Category::Dub => &self.dub,
            Category::Raw => &self.raw,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Vec<ServerDescriptor> {
        match category {
            Category::Sub => &mut self.sub,
            Category::Dub => &mut self.dub,
            Category::Raw => &mut self.raw,
        }
    }

    /// Categories that own at least one server, in priority order.
    pub fn available(&self) -> Vec<Category> {
        Category::PRIORITY
            .into_iter()
            .filter(|c| !self.get(*c).is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.available().is_empty()
    }

    pub fn find(&self, category: Category, server_id: &str) -> Option<&ServerDescriptor> {
        self.get(category).iter().find(|s| s.id == server_id)
    }
}

/// One entry of the upstream `players` list. Any field may be missing or
/// carry the wrong JSON type; unknown fields are kept for URL harvesting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Player {
    #[serde(deserialize_with = "loose::text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "loose::text")]
    pub url: Option<String>,
    #[serde(deserialize_with = "loose::text")]
    pub src: Option<String>,
    #[serde(deserialize_with = "loose::text")]
    pub link: Option<String>,
    #[serde(deserialize_with = "loose::text")]
    pub file: Option<String>,
    #[serde(deserialize_with = "loose::text", alias = "type")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Player {
    /// First non-empty of `url`, `src`, `link`, `file`.
    pub fn raw_url(&self) -> Option<&str> {
        [&self.url, &self.src, &self.link, &self.file]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .find(|s| !s.trim().is_empty())
    }
}

/// One entry of the secondary video-source `medias` list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaEntry {
    #[serde(deserialize_with = "loose::text")]
    pub url: Option<String>,
    #[serde(deserialize_with = "loose::text")]
    pub quality: Option<String>,
    #[serde(deserialize_with = "loose::text")]
    pub resolution: Option<String>,
    #[serde(deserialize_with = "loose::text")]
    pub format: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EpisodeResult {
    #[serde(deserialize_with = "loose::list")]
    pub players: Vec<Player>,
    #[serde(deserialize_with = "loose::text")]
    pub root: Option<String>,
}

/// `GET /episode/{id}` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EpisodePayload {
    #[serde(deserialize_with = "loose::or_default")]
    pub result: EpisodeResult,
}

impl EpisodePayload {
    /// Never fails: anything unparseable degrades to an empty payload.
    pub fn from_value(v: serde_json::Value) -> Self {
        serde_json::from_value(v).unwrap_or_default()
    }
}

/// `GET /video-source/{id}` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaPayload {
    #[serde(deserialize_with = "loose::list")]
    pub medias: Vec<MediaEntry>,
}

impl MediaPayload {
    pub fn from_value(v: serde_json::Value) -> Self {
        serde_json::from_value(v).unwrap_or_default()
    }
}

/// Deserializers that accept whatever upstream sends and default the rest.
mod loose {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn text<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|x| serde_json::from_value(x).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let v = Value::deserialize(d)?;
        Ok(serde_json::from_value(v).unwrap_or_default())
    }
}
