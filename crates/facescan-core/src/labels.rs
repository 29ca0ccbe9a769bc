//! Label tables for attribute classes.
//!
//! Inference backends report raw class names in several spellings
//! ("happy" / "happiness", "Man" / "male"). Each table maps those to a
//! canonical variant, and anything unrecognised to an explicit `Unknown`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    Contempt,
    Unknown,
}

impl Emotion {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "angry" | "anger" => Emotion::Angry,
            "disgust" => Emotion::Disgust,
            "fear" => Emotion::Fear,
            "happy" | "happiness" => Emotion::Happy,
            "sad" | "sadness" => Emotion::Sad,
            "surprise" => Emotion::Surprise,
            "neutral" => Emotion::Neutral,
            "contempt" => Emotion::Contempt,
            _ => Emotion::Unknown,
        }
    }

    /// FER+ output order: neutral, happiness, surprise, sadness, anger,
    /// disgust, fear, contempt.
    pub fn from_ferplus_index(idx: usize) -> Self {
        match idx {
            0 => Emotion::Neutral,
            1 => Emotion::Happy,
            2 => Emotion::Surprise,
            3 => Emotion::Sad,
            4 => Emotion::Angry,
            5 => Emotion::Disgust,
            6 => Emotion::Fear,
            7 => Emotion::Contempt,
            _ => Emotion::Unknown,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
            Emotion::Contempt => "Contempt",
            Emotion::Unknown => "N/A",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Man,
    Woman,
    Unknown,
}

impl Gender {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "man" | "male" | "m" => Gender::Man,
            "woman" | "female" | "f" => Gender::Woman,
            _ => Gender::Unknown,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Gender::Man => "Man",
            Gender::Woman => "Woman",
            Gender::Unknown => "N/A",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Race {
    Asian,
    Indian,
    Black,
    White,
    MiddleEastern,
    LatinoHispanic,
    Unknown,
}

impl Race {
    /// Class order of six-way race classifiers.
    pub const CLASSES: [Race; 6] = [
        Race::Asian,
        Race::Indian,
        Race::Black,
        Race::White,
        Race::MiddleEastern,
        Race::LatinoHispanic,
    ];

    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match normalized.as_str() {
            "asian" => Race::Asian,
            "indian" => Race::Indian,
            "black" => Race::Black,
            "white" => Race::White,
            "middleeastern" => Race::MiddleEastern,
            "latinohispanic" | "latino" | "hispanic" => Race::LatinoHispanic,
            _ => Race::Unknown,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        Self::CLASSES.get(idx).copied().unwrap_or(Race::Unknown)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Race::Asian => "Asian",
            Race::Indian => "Indian",
            Race::Black => "Black",
            Race::White => "White",
            Race::MiddleEastern => "Middle Eastern",
            Race::LatinoHispanic => "Latino Hispanic",
            Race::Unknown => "N/A",
        }
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
