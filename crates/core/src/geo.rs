use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    SoutheastAsia,
    AsiaPacific,
    Europe,
    NorthAmerica,
    LatinAmerica,
    MiddleEastAfrica,
    Oceania,
    Worldwide,
}

impl Area {
    /// Base premium per traveler per day, before age and tier multipliers.
    pub fn base_daily_rate(&self) -> Decimal {
        match self {
            Self::SoutheastAsia => Decimal::new(250, 2),
            Self::AsiaPacific => Decimal::new(350, 2),
            Self::Europe => Decimal::new(400, 2),
            Self::NorthAmerica => Decimal::new(550, 2),
            Self::LatinAmerica => Decimal::new(400, 2),
            Self::MiddleEastAfrica => Decimal::new(450, 2),
            Self::Oceania => Decimal::new(450, 2),
            Self::Worldwide => Decimal::new(600, 2),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SoutheastAsia => "Southeast Asia",
            Self::AsiaPacific => "Asia Pacific",
            Self::Europe => "Europe",
            Self::NorthAmerica => "North America",
            Self::LatinAmerica => "Latin America",
            Self::MiddleEastAfrica => "Middle East & Africa",
            Self::Oceania => "Oceania",
            Self::Worldwide => "Worldwide",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaAssignment {
    pub area: Area,
    pub base_daily_rate: Decimal,
}

impl From<Area> for AreaAssignment {
    fn from(area: Area) -> Self {
        Self { area, base_daily_rate: area.base_daily_rate() }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DestinationProfile {
    pub name: &'static str,
    pub country_code: &'static str,
    pub area: Area,
    pub aliases: &'static [&'static str],
    pub tropical: bool,
    pub landlocked: bool,
}

const fn dest(
    name: &'static str,
    country_code: &'static str,
    area: Area,
    aliases: &'static [&'static str],
    tropical: bool,
    landlocked: bool,
) -> DestinationProfile {
    DestinationProfile { name, country_code, area, aliases, tropical, landlocked }
}

use self::Area::{
    AsiaPacific, Europe, LatinAmerica, MiddleEastAfrica, NorthAmerica, Oceania, SoutheastAsia,
};

pub static DESTINATIONS: &[DestinationProfile] = &[
    dest("Thailand", "TH", SoutheastAsia, &["bangkok", "phuket", "chiang mai", "krabi"], true, false),
    dest("Vietnam", "VN", SoutheastAsia, &["viet nam", "hanoi", "ho chi minh", "saigon"], true, false),
    dest("Indonesia", "ID", SoutheastAsia, &["bali", "jakarta", "lombok"], true, false),
    dest("Malaysia", "MY", SoutheastAsia, &["kuala lumpur", "penang", "langkawi"], true, false),
    dest("Singapore", "SG", SoutheastAsia, &[], true, false),
    dest("Philippines", "PH", SoutheastAsia, &["manila", "cebu", "palawan", "boracay"], true, false),
    dest("Cambodia", "KH", SoutheastAsia, &["siem reap", "phnom penh"], true, false),
    dest("Laos", "LA", SoutheastAsia, &["vientiane", "luang prabang"], true, true),
    dest("Japan", "JP", AsiaPacific, &["tokyo", "osaka", "kyoto", "hokkaido", "niseko"], false, false),
    dest("South Korea", "KR", AsiaPacific, &["korea", "seoul", "busan"], false, false),
    dest("China", "CN", AsiaPacific, &["beijing", "shanghai"], false, false),
    dest("Hong Kong", "HK", AsiaPacific, &[], false, false),
    dest("Taiwan", "TW", AsiaPacific, &["taipei"], false, false),
    dest("India", "IN", AsiaPacific, &["delhi", "mumbai", "goa"], false, false),
    dest("Nepal", "NP", AsiaPacific, &["kathmandu", "pokhara", "everest"], false, true),
    dest("Mongolia", "MN", AsiaPacific, &["ulaanbaatar"], false, true),
    dest("Sri Lanka", "LK", AsiaPacific, &["colombo"], true, false),
    dest("Maldives", "MV", AsiaPacific, &[], true, false),
    dest("France", "FR", Europe, &["paris", "chamonix"], false, false),
    dest("Italy", "IT", Europe, &["rome", "milan", "venice", "florence"], false, false),
    dest("Spain", "ES", Europe, &["madrid", "barcelona", "ibiza"], false, false),
    dest("Germany", "DE", Europe, &["berlin", "munich"], false, false),
    dest("United Kingdom", "GB", Europe, &["uk", "england", "london", "scotland"], false, false),
    dest("Switzerland", "CH", Europe, &["zurich", "geneva", "zermatt"], false, true),
    dest("Austria", "AT", Europe, &["vienna", "innsbruck"], false, true),
    dest("Czech Republic", "CZ", Europe, &["czechia", "prague"], false, true),
    dest("Hungary", "HU", Europe, &["budapest"], false, true),
    dest("Greece", "GR", Europe, &["athens", "santorini", "mykonos"], false, false),
    dest("Iceland", "IS", Europe, &["reykjavik"], false, false),
    dest("United States", "US", NorthAmerica, &["usa", "new york", "los angeles", "hawaii"], false, false),
    dest("Canada", "CA", NorthAmerica, &["toronto", "vancouver", "whistler"], false, false),
    dest("Mexico", "MX", LatinAmerica, &["cancun", "mexico city"], false, false),
    dest("Brazil", "BR", LatinAmerica, &["rio de janeiro", "sao paulo"], true, false),
    dest("Peru", "PE", LatinAmerica, &["lima", "cusco", "machu picchu"], false, false),
    dest("Bolivia", "BO", LatinAmerica, &["la paz"], true, true),
    dest("Argentina", "AR", LatinAmerica, &["buenos aires", "patagonia"], false, false),
    dest("Chile", "CL", LatinAmerica, &["santiago"], false, false),
    dest("United Arab Emirates", "AE", MiddleEastAfrica, &["uae", "dubai", "abu dhabi"], false, false),
    dest("Egypt", "EG", MiddleEastAfrica, &["cairo"], false, false),
    dest("Morocco", "MA", MiddleEastAfrica, &["marrakech", "marrakesh"], false, false),
    dest("Kenya", "KE", MiddleEastAfrica, &["nairobi"], true, false),
    dest("Tanzania", "TZ", MiddleEastAfrica, &["zanzibar", "kilimanjaro"], true, false),
    dest("South Africa", "ZA", MiddleEastAfrica, &["cape town", "johannesburg"], false, false),
    dest("Australia", "AU", Oceania, &["sydney", "melbourne", "brisbane"], false, false),
    dest("New Zealand", "NZ", Oceania, &["auckland", "queenstown"], false, false),
    dest("Fiji", "FJ", Oceania, &[], true, false),
];

/// Exact lookup by display name, alias, or ISO country code.
pub fn lookup(destination: &str) -> Option<&'static DestinationProfile> {
    let normalized = normalize(destination);
    if normalized.is_empty() {
        return None;
    }

    DESTINATIONS.iter().find(|profile| {
        normalize(profile.name) == normalized
            || profile.aliases.iter().any(|alias| *alias == normalized)
            || profile.country_code.eq_ignore_ascii_case(destination.trim())
    })
}

/// Finds the destination mentioned in free text, preferring the longest
/// matching name or alias.
pub fn scan_utterance(text: &str) -> Option<&'static DestinationProfile> {
    let padded = format!(" {} ", normalize(text));

    DESTINATIONS
        .iter()
        .flat_map(|profile| {
            std::iter::once(profile.name)
                .chain(profile.aliases.iter().copied())
                .map(move |term| (profile, term))
        })
        .filter(|(_, term)| padded.contains(&format!(" {} ", normalize(term))))
        .max_by_key(|(_, term)| term.len())
        .map(|(profile, _)| profile)
}

/// Area and base rate for a destination; unknown places price as worldwide.
pub fn assign_area(destination: &str) -> AreaAssignment {
    lookup(destination).map(|profile| profile.area).unwrap_or(Area::Worldwide).into()
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
