use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

pub const DEFAULT_FALLBACK_IMAGE_URL: &str =
    "https://dummyimage.com/1080x1080/111827/f5f5f5.png&text=Backup";

/// Customer record as received from the caller. Extra fields are ignored.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Profile {
    pub contact_id: String,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub locale: String,
    pub country: String,
    pub city: String,
    pub tags: BTreeSet<String>,
    pub interest_keywords: BTreeSet<String>,
    pub age_range: Option<String>,
    pub gender: Option<String>,
    #[serde(alias = "budget_range")]
    pub price_tier: Option<String>,
    pub preferred_category: Option<String>,
    pub copy_tone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Hoodies,
    Sneakers,
    Outerwear,
    Denim,
    Accessories,
    Dresses,
    Tops,
    Bottoms,
    Handbag,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Hoodies => "hoodies",
            ProductCategory::Sneakers => "sneakers",
            ProductCategory::Outerwear => "outerwear",
            ProductCategory::Denim => "denim",
            ProductCategory::Accessories => "accessories",
            ProductCategory::Dresses => "dresses",
            ProductCategory::Tops => "tops",
            ProductCategory::Bottoms => "bottoms",
            ProductCategory::Handbag => "handbag",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceBand {
    #[serde(alias = "budget")]
    Value,
    #[default]
    Mid,
    Premium,
    Luxury,
}

impl PriceBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceBand::Value => "value",
            PriceBand::Mid => "mid",
            PriceBand::Premium => "premium",
            PriceBand::Luxury => "luxury",
        }
    }
}

impl fmt::Display for PriceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaunchType {
    Drop,
    #[default]
    Evergreen,
    Sale,
}

impl LaunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchType::Drop => "drop",
            LaunchType::Evergreen => "evergreen",
            LaunchType::Sale => "sale",
        }
    }
}

impl fmt::Display for LaunchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog item the creative is built around.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Product {
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub title: String,
    pub category: ProductCategory,
    #[serde(default)]
    pub colorways: Vec<String>,
    #[serde(default)]
    pub price_band: PriceBand,
    #[serde(default)]
    pub launch_type: LaunchType,
    #[serde(default)]
    pub brand_name: String,
}

impl Product {
    /// Title used in prompts and copy; falls back to the category when the caller sent none.
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            format!("{} {}", self.brand_name, self.category).trim().to_string()
        } else {
            self.title.clone()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:5")]
    Portrait,
    #[serde(rename = "9:16")]
    Story,
}

impl AspectRatio {
    /// Provider dimensions for the ratio. Both sides are multiples of 32.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1024, 1024),
            AspectRatio::Portrait => (896, 1120),
            AspectRatio::Story => (768, 1344),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    InstagramFeed,
    InstagramStory,
    FacebookFeed,
    Tiktok,
    Pinterest,
    Email,
    WebBanner,
}

/// Per-request generation settings. Every field has a server-side default.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Options {
    pub aspect: AspectRatio,
    pub channel: Channel,
    pub fallback_image_url: String,
    pub ab_variant: String,
    pub copy_tone: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            aspect: AspectRatio::default(),
            channel: Channel::default(),
            fallback_image_url: DEFAULT_FALLBACK_IMAGE_URL.to_string(),
            ab_variant: "A".to_string(),
            copy_tone: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persona {
    Streetwear,
    Minimalist,
    LuxuryClassic,
    Athleisure,
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Persona::Streetwear => "Streetwear",
            Persona::Minimalist => "Minimalist",
            Persona::LuxuryClassic => "LuxuryClassic",
            Persona::Athleisure => "Athleisure",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AdCopy {
    pub subject: String,
    pub body: String,
}

/// Accumulated output of one workflow run.
///
/// `copy` is `None` until the copy step has run; `Some` with empty text means
/// the step completed without usable copy.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Creative {
    pub image_url: Option<String>,
    pub copy: Option<AdCopy>,
    pub persona: Option<Persona>,
    #[serde(default)]
    pub color_palette: Vec<String>,
    pub image_prompt: Option<String>,
    pub polling_url: Option<String>,
    pub request_id: Option<String>,
    /// Last known state of the image job, absent when nothing was submitted.
    pub job_state: Option<JobState>,
}

impl Creative {
    pub fn is_usable(&self) -> bool {
        self.image_url.is_some() && self.persona.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

/// Handle for an in-flight image request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationJob {
    pub request_id: String,
    pub polling_url: Option<String>,
    pub state: JobState,
}

/// Provider-side status of an image job, normalized across provider spellings.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Ready,
    Error,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PollResult {
    pub request_id: String,
    pub status: JobStatus,
    pub image_url: Option<String>,
    pub error: Option<String>,
}

/// Body accepted by the workflow boundary. Absent parts are reported as missing input.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CreativeRequest {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub product: Option<Product>,
    #[serde(default)]
    pub options: Option<Options>,
}
