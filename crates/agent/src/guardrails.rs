//! Impossible-activity checks for the adventure-sports answer.
//!
//! Every destination/activity conflict lives in [`ACTIVITY_RULES`]; callers
//! never test destination traits directly.

use tripcover_core::geo::DestinationProfile;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityClass {
    SnowSport,
    SeaWaterSport,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestinationTrait {
    Tropical,
    Landlocked,
}

impl DestinationTrait {
    fn holds_for(&self, profile: &DestinationProfile) -> bool {
        match self {
            Self::Tropical => profile.tropical,
            Self::Landlocked => profile.landlocked,
        }
    }
}

#[derive(Debug)]
pub struct ActivityRule {
    pub class: ActivityClass,
    pub conflicts_with: DestinationTrait,
    pub reason_code: &'static str,
    pub explanation: &'static str,
}

pub static ACTIVITY_RULES: &[ActivityRule] = &[
    ActivityRule {
        class: ActivityClass::SnowSport,
        conflicts_with: DestinationTrait::Tropical,
        reason_code: "snow_sport_tropical_destination",
        explanation: "there's no natural snow for that there",
    },
    ActivityRule {
        class: ActivityClass::SeaWaterSport,
        conflicts_with: DestinationTrait::Landlocked,
        reason_code: "sea_sport_landlocked_destination",
        explanation: "it has no coastline",
    },
];

/// Activity vocabulary matched on word boundaries. Freshwater activities such
/// as rafting and kayaking are not sea sports.
static ACTIVITIES: &[(&str, ActivityClass)] = &[
    ("ski", ActivityClass::SnowSport),
    ("skiing", ActivityClass::SnowSport),
    ("snowboard", ActivityClass::SnowSport),
    ("snowboarding", ActivityClass::SnowSport),
    ("snowmobile", ActivityClass::SnowSport),
    ("snowmobiling", ActivityClass::SnowSport),
    ("ice climbing", ActivityClass::SnowSport),
    ("scuba", ActivityClass::SeaWaterSport),
    ("scuba diving", ActivityClass::SeaWaterSport),
    ("diving", ActivityClass::SeaWaterSport),
    ("snorkel", ActivityClass::SeaWaterSport),
    ("snorkeling", ActivityClass::SeaWaterSport),
    ("snorkelling", ActivityClass::SeaWaterSport),
    ("surf", ActivityClass::SeaWaterSport),
    ("surfing", ActivityClass::SeaWaterSport),
    ("kitesurfing", ActivityClass::SeaWaterSport),
    ("windsurfing", ActivityClass::SeaWaterSport),
    ("parasailing", ActivityClass::SeaWaterSport),
    ("hiking", ActivityClass::Other),
    ("trekking", ActivityClass::Other),
    ("mountaineering", ActivityClass::Other),
    ("climbing", ActivityClass::Other),
    ("bungee", ActivityClass::Other),
    ("skydiving", ActivityClass::Other),
    ("paragliding", ActivityClass::Other),
    ("rafting", ActivityClass::Other),
    ("kayaking", ActivityClass::Other),
    ("safari", ActivityClass::Other),
    ("adventure", ActivityClass::Other),
    ("extreme sports", ActivityClass::Other),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

/// Activities mentioned in the utterance, in vocabulary order.
pub fn mentioned_activities(text: &str) -> Vec<(&'static str, ActivityClass)> {
    let padded = format!(" {} ", normalize(text));
    ACTIVITIES
        .iter()
        .filter(|(keyword, _)| padded.contains(&format!(" {keyword} ")))
        .copied()
        .collect()
}

pub fn mentions_adventure(text: &str) -> bool {
    !mentioned_activities(text).is_empty()
}

/// Checks the activities in `text` against the destination. The first
/// conflicting rule denies and carries the corrective notice.
pub fn evaluate_activities(profile: &DestinationProfile, text: &str) -> GuardrailDecision {
    let activities = mentioned_activities(text);
    let conflict = ACTIVITY_RULES.iter().find_map(|rule| {
        activities
            .iter()
            .find(|(_, class)| *class == rule.class && rule.conflicts_with.holds_for(profile))
            .map(|(keyword, _)| (rule, *keyword))
    });

    match conflict {
        Some((rule, keyword)) => GuardrailDecision::Deny {
            reason_code: rule.reason_code,
            user_message: format!(
                "Just a heads-up: {keyword} isn't something you can do in {} because {}, so I've \
                 left adventure sports cover off. Let me know if you're planning anything else \
                 adventurous.",
                profile.name, rule.explanation
            ),
            fallback_path: "adventure_sports_declined",
        },
        None => GuardrailDecision::Allow,
    }
}

fn normalize(text: &str) -> String {
    text.to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
