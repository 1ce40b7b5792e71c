use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The fixed set of audience perspectives. The orchestrator is authoritative
/// over which perspective produced a reaction; extracted text never overrides
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    Literal,
    Fan,
    Heckler,
    Critic,
    Absurdist,
    Deadpan,
}

impl Perspective {
    pub const ALL: [Perspective; 6] = [
        Perspective::Literal,
        Perspective::Fan,
        Perspective::Heckler,
        Perspective::Critic,
        Perspective::Absurdist,
        Perspective::Deadpan,
    ];
}

impl std::fmt::Display for Perspective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Perspective::Literal => write!(f, "literal"),
            Perspective::Fan => write!(f, "fan"),
            Perspective::Heckler => write!(f, "heckler"),
            Perspective::Critic => write!(f, "critic"),
            Perspective::Absurdist => write!(f, "absurdist"),
            Perspective::Deadpan => write!(f, "deadpan"),
        }
    }
}

impl std::str::FromStr for Perspective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "literal" | "literalist" => Ok(Perspective::Literal),
            "fan" | "superfan" => Ok(Perspective::Fan),
            "heckler" => Ok(Perspective::Heckler),
            "critic" => Ok(Perspective::Critic),
            "absurdist" => Ok(Perspective::Absurdist),
            "deadpan" => Ok(Perspective::Deadpan),
            _ => Err(format!("Unknown perspective: {}", s)),
        }
    }
}

/// Ordinal laugh temperature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Warmth {
    Cold,
    #[default]
    Warm,
    Hot,
}

impl std::fmt::Display for Warmth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warmth::Cold => write!(f, "cold"),
            Warmth::Warm => write!(f, "warm"),
            Warmth::Hot => write!(f, "hot"),
        }
    }
}

impl std::str::FromStr for Warmth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cold" | "low" | "none" => Ok(Warmth::Cold),
            "warm" | "medium" | "mild" => Ok(Warmth::Warm),
            "hot" | "high" | "big" => Ok(Warmth::Hot),
            _ => Err(format!("Unknown warmth: {}", s)),
        }
    }
}

/// Ordinal low/medium/high scale, used for energy and edge ratings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::Medium => write!(f, "medium"),
            Level::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "cold" | "none" => Ok(Level::Low),
            "medium" | "mid" | "moderate" | "warm" => Ok(Level::Medium),
            "high" | "hot" | "extreme" => Ok(Level::High),
            _ => Err(format!("Unknown level: {}", s)),
        }
    }
}

/// Risk ordinal carried by a synthesis verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "minimal" => Ok(RiskLevel::Low),
            "medium" | "mid" | "moderate" => Ok(RiskLevel::Medium),
            "high" | "severe" => Ok(RiskLevel::High),
            "unknown" => Ok(RiskLevel::Unknown),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

/// One perspective's simulated reaction to the submitted line.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Reaction {
    pub id: Uuid,

    pub analysis_id: Uuid,

    pub perspective: Perspective,

    #[serde(default)]
    pub reaction: String,

    #[serde(default)]
    pub laugh: Warmth,

    #[serde(default)]
    pub energy: Level,

    #[serde(default)]
    pub edge: Level,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// An exploration angle lifted out of a reaction. Never created standalone;
/// its id is a deterministic function of the parent reaction id and ordinal.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Angle {
    pub id: String,

    pub reaction_id: Uuid,

    pub name: String,

    #[serde(default)]
    pub elaboration: String,
}

impl Angle {
    /// Derive a stable angle id from the parent reaction and ordinal position.
    pub fn derive_id(reaction_id: Uuid, ordinal: usize) -> String {
        let input = format!("{}|{}", reaction_id, ordinal);
        let hash = Sha256::digest(input.as_bytes());
        format!("{:x}", hash)[..12].to_string()
    }
}

/// Synthesized divergence/risk assessment across all reactions of one
/// analysis. At most one per analysis.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Verdict {
    pub analysis_id: Uuid,

    /// Conventionally 0-100, not enforced.
    pub divergence: f64,

    pub risk: RiskLevel,

    /// Canonical conflict-pair label: lower-cased, punctuation-stripped,
    /// operands sorted, joined with " vs ".
    pub conflict: String,

    #[serde(default)]
    pub explanation: String,

    #[serde(default)]
    pub recommendation: String,

    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Aggregate root for one submitted line. Reactions are kept in fan-out
/// completion order. Append-only while the session is live.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: Uuid,

    pub line: String,

    pub created_at: DateTime<Utc>,

    pub reactions: Vec<Reaction>,

    pub angles: Vec<Angle>,

    pub verdict: Option<Verdict>,
}

impl Analysis {
    pub fn new(line: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            line,
            created_at: Utc::now(),
            reactions: Vec::new(),
            angles: Vec::new(),
            verdict: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_id_stability() {
        let parent = Uuid::new_v4();
        let id1 = Angle::derive_id(parent, 0);
        let id2 = Angle::derive_id(parent, 0);

        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 12);
    }

    #[test]
    fn test_angle_id_varies_by_ordinal() {
        let parent = Uuid::new_v4();
        assert_ne!(Angle::derive_id(parent, 0), Angle::derive_id(parent, 1));
    }

    #[test]
    fn test_angle_id_varies_by_parent() {
        assert_ne!(
            Angle::derive_id(Uuid::new_v4(), 0),
            Angle::derive_id(Uuid::new_v4(), 0)
        );
    }

    #[test]
    fn test_warmth_synonyms() {
        assert_eq!("HOT".parse::<Warmth>().unwrap(), Warmth::Hot);
        assert_eq!("medium".parse::<Warmth>().unwrap(), Warmth::Warm);
        assert_eq!("cold".parse::<Warmth>().unwrap(), Warmth::Cold);
        assert!("scorching".parse::<Warmth>().is_err());
    }

    #[test]
    fn test_level_synonyms() {
        assert_eq!("moderate".parse::<Level>().unwrap(), Level::Medium);
        assert_eq!("High".parse::<Level>().unwrap(), Level::High);
    }

    #[test]
    fn test_risk_defaults_to_unknown() {
        assert_eq!(RiskLevel::default(), RiskLevel::Unknown);
        assert_eq!("severe".parse::<RiskLevel>().unwrap(), RiskLevel::High);
    }

    #[test]
    fn test_perspective_roundtrip() {
        for p in Perspective::ALL {
            let parsed: Perspective = p.to_string().parse().unwrap();
            assert_eq!(parsed, p);
        }
    }
}
