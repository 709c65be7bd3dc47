//! Opportunity record and its enumerated axes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain tags offered as filter choices and search suggestions.
pub const DOMAINS: [&str; 12] = [
    "AI/ML",
    "Web Development",
    "Mobile Development",
    "Cybersecurity",
    "Blockchain",
    "Cloud Computing",
    "Data Science",
    "IoT",
    "Game Development",
    "DevOps",
    "Systems Programming",
    "Open Source",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown category '{0}'")]
    Category(String),
    #[error("unknown mode '{0}'")]
    Mode(String),
    #[error("unknown level '{0}'")]
    Level(String),
    #[error("unknown status '{0}'")]
    Status(String),
    #[error("unknown sort key '{0}'")]
    SortKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Hackathon,
    Internship,
    Opensource,
    Fellowship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Online,
    Offline,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

/// Temporal classification of an opportunity's application window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Upcoming,
    Ongoing,
    Past,
}

/// Badge tone used by presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Info,
    Success,
    Muted,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Hackathon,
        Category::Internship,
        Category::Opensource,
        Category::Fellowship,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Hackathon => "hackathon",
            Category::Internship => "internship",
            Category::Opensource => "opensource",
            Category::Fellowship => "fellowship",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Hackathon => "Hackathon",
            Category::Internship => "Internship",
            Category::Opensource => "Open Source Program",
            Category::Fellowship => "Fellowship",
        }
    }

    /// Icon identifier for the category badge.
    pub fn icon(self) -> &'static str {
        match self {
            Category::Hackathon => "trophy",
            Category::Internship => "briefcase",
            Category::Opensource => "git-branch",
            Category::Fellowship => "graduation-cap",
        }
    }
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Online, Mode::Offline, Mode::Hybrid];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Online => "online",
            Mode::Offline => "offline",
            Mode::Hybrid => "hybrid",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Online => "Online",
            Mode::Offline => "Offline",
            Mode::Hybrid => "Hybrid",
        }
    }
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Advanced];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
        }
    }
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Upcoming, Status::Ongoing, Status::Past];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Upcoming => "upcoming",
            Status::Ongoing => "ongoing",
            Status::Past => "past",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Upcoming => "Upcoming",
            Status::Ongoing => "Ongoing",
            Status::Past => "Past",
        }
    }

    pub fn tone(self) -> Tone {
        match self {
            Status::Upcoming => Tone::Info,
            Status::Ongoing => Tone::Success,
            Status::Past => Tone::Muted,
        }
    }
}

macro_rules! impl_str_conversions {
    ($ty:ty, $err:ident) => {
        impl FromStr for $ty {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| ParseError::$err(s.to_string()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_str_conversions!(Category, Category);
impl_str_conversions!(Mode, Mode);
impl_str_conversions!(Level, Level);
impl_str_conversions!(Status, Status);

/// A single catalog entry. Records are built once by the catalog layer and
/// are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub name: String,
    pub organizer: String,
    pub description: String,
    pub category: Category,
    pub mode: Mode,
    pub level: Level,

    pub application_start: DateTime<Utc>,
    pub application_end: DateTime<Utc>,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,

    #[serde(default)]
    pub location: Option<String>,
    pub country: String,
    #[serde(default)]
    pub is_india_focused: bool,

    #[serde(default)]
    pub eligibility: Vec<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub stipend: Option<String>,
    #[serde(default)]
    pub prizes: Option<String>,
    #[serde(default)]
    pub selection_criteria: Option<String>,

    pub official_link: String,
    #[serde(default)]
    pub application_link: Option<String>,

    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub banner_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// True when the entry advertises a stipend or prize money.
    pub fn has_monetary_benefit(&self) -> bool {
        self.stipend.is_some() || self.prizes.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_parsing_is_case_insensitive_and_rejects_unknowns() {
        assert_eq!("Hackathon".parse::<Category>(), Ok(Category::Hackathon));
        assert_eq!(" hybrid ".parse::<Mode>(), Ok(Mode::Hybrid));
        assert_eq!("ADVANCED".parse::<Level>(), Ok(Level::Advanced));
        assert_eq!("past".parse::<Status>(), Ok(Status::Past));
        assert_eq!(
            "bootcamp".parse::<Category>(),
            Err(ParseError::Category("bootcamp".into()))
        );
    }

    #[test]
    fn every_category_has_distinct_display_metadata() {
        let labels: std::collections::HashSet<_> =
            Category::ALL.iter().map(|c| c.label()).collect();
        let icons: std::collections::HashSet<_> = Category::ALL.iter().map(|c| c.icon()).collect();
        assert_eq!(labels.len(), Category::ALL.len());
        assert_eq!(icons.len(), Category::ALL.len());
        assert_eq!(Category::Opensource.label(), "Open Source Program");
    }

    #[test]
    fn serde_uses_lowercase_tags() {
        let json = serde_json::to_string(&(Category::Opensource, Mode::Offline, Status::Ongoing))
            .unwrap();
        assert_eq!(json, r#"["opensource","offline","ongoing"]"#);
    }
}
