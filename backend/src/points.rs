//! Typed foot measurement points.
//!
//! Device firmware addresses points by display string ("Right Heel",
//! "Left 5th MT"). Parsing goes through an alias table and yields a typed
//! result; unrecognized names are carried as-is so callers can decide to
//! skip or log them instead of failing the whole request.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Foot {
    Right,
    Left,
}

impl Foot {
    pub const BOTH: [Foot; 2] = [Foot::Right, Foot::Left];

    pub fn as_str(&self) -> &'static str {
        match self {
            Foot::Right => "right",
            Foot::Left => "left",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Foot::Right => "Right",
            Foot::Left => "Left",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointSlot {
    Heel,
    Instep,
    FifthMt,
    ThirdMt,
    FirstMt,
    BigToe,
}

impl PointSlot {
    /// Display order, heel to toe.
    pub const ALL: [PointSlot; 6] = [
        PointSlot::Heel,
        PointSlot::Instep,
        PointSlot::FifthMt,
        PointSlot::ThirdMt,
        PointSlot::FirstMt,
        PointSlot::BigToe,
    ];

    /// Key used in the current-readings snapshot maps.
    pub fn snapshot_key(self) -> &'static str {
        match self {
            PointSlot::Heel => "heel",
            PointSlot::Instep => "instep",
            PointSlot::FifthMt => "5th_mt",
            PointSlot::ThirdMt => "3rd_mt",
            PointSlot::FirstMt => "1st_mt",
            PointSlot::BigToe => "big_toe",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PointSlot::Heel => "Heel",
            PointSlot::Instep => "In Step",
            PointSlot::FifthMt => "5th MT",
            PointSlot::ThirdMt => "3rd MT",
            PointSlot::FirstMt => "1st MT",
            PointSlot::BigToe => "Big Toe",
        }
    }

    /// VPT classification threshold in volts. The metatarsal heads bear
    /// more load and tolerate a higher threshold.
    pub fn vpt_threshold(self) -> f64 {
        match self {
            PointSlot::FifthMt | PointSlot::FirstMt => 10.0,
            _ => 5.0,
        }
    }

    fn from_alias(raw: &str) -> Option<Self> {
        match raw {
            "heel" => Some(PointSlot::Heel),
            "in_step" | "instep" => Some(PointSlot::Instep),
            "5th_mt" | "fifth_mt" => Some(PointSlot::FifthMt),
            "3rd_mt" | "third_mt" => Some(PointSlot::ThirdMt),
            "1st_mt" | "first_mt" => Some(PointSlot::FirstMt),
            "big_toe" | "bigtoe" => Some(PointSlot::BigToe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeasurementPoint {
    pub foot: Foot,
    pub slot: PointSlot,
}

impl fmt::Display for MeasurementPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.foot.title(), self.slot.display_name())
    }
}

/// Outcome of parsing a free-text point name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPoint {
    Known(MeasurementPoint),
    Unrecognized(String),
}

impl ParsedPoint {
    pub fn known(&self) -> Option<MeasurementPoint> {
        match self {
            ParsedPoint::Known(p) => Some(*p),
            ParsedPoint::Unrecognized(_) => None,
        }
    }
}

/// Split on whitespace: first token is the foot, the rest joined with
/// underscores is looked up in the alias table. Case-insensitive.
pub fn parse_point_name(name: &str) -> ParsedPoint {
    let mut parts = name.split_whitespace();

    let foot = match parts.next().map(|t| t.to_ascii_lowercase()).as_deref() {
        Some("right") => Foot::Right,
        Some("left") => Foot::Left,
        _ => return ParsedPoint::Unrecognized(name.to_owned()),
    };

    let location = parts
        .map(|t| t.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_");

    match PointSlot::from_alias(&location) {
        Some(slot) => ParsedPoint::Known(MeasurementPoint { foot, slot }),
        None => ParsedPoint::Unrecognized(name.to_owned()),
    }
}

/// The six canonical display names of one foot, heel to toe.
pub fn foot_point_names(foot: Foot) -> Vec<String> {
    PointSlot::ALL
        .iter()
        .map(|slot| MeasurementPoint { foot, slot: *slot }.to_string())
        .collect()
}

/// The twelve canonical display names, right foot first.
pub fn canonical_point_names() -> Vec<String> {
    Foot::BOTH
        .iter()
        .flat_map(|foot| foot_point_names(*foot))
        .collect()
}

/// Expected-point-set templates selectable by a session's protocol name.
/// Unknown protocols carry no template; the session then falls back to
/// the any-measurement-counts progress rule.
pub fn protocol_points(protocol: &str) -> Option<Vec<String>> {
    match protocol {
        "full-foot" => Some(canonical_point_names()),
        "right-foot" => Some(foot_point_names(Foot::Right)),
        "left-foot" => Some(foot_point_names(Foot::Left)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names_parse_back() {
        let names = canonical_point_names();
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "Right Heel");
        assert_eq!(names[11], "Left Big Toe");
        for name in names {
            assert!(matches!(parse_point_name(&name), ParsedPoint::Known(_)), "{name}");
        }
    }

    #[test]
    fn test_aliases() {
        let expect = |name: &str, foot: Foot, slot: PointSlot| {
            assert_eq!(
                parse_point_name(name),
                ParsedPoint::Known(MeasurementPoint { foot, slot }),
                "{name}"
            );
        };
        expect("Right In Step", Foot::Right, PointSlot::Instep);
        expect("right instep", Foot::Right, PointSlot::Instep);
        expect("Left 5th MT", Foot::Left, PointSlot::FifthMt);
        expect("left fifth mt", Foot::Left, PointSlot::FifthMt);
        expect("LEFT BIGTOE", Foot::Left, PointSlot::BigToe);
        expect("right 1st mt", Foot::Right, PointSlot::FirstMt);
        expect("Right 3rd MT", Foot::Right, PointSlot::ThirdMt);
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(
            parse_point_name("Forehead"),
            ParsedPoint::Unrecognized("Forehead".to_owned())
        );
        assert_eq!(
            parse_point_name("Right Shin"),
            ParsedPoint::Unrecognized("Right Shin".to_owned())
        );
        assert_eq!(parse_point_name(""), ParsedPoint::Unrecognized(String::new()));
    }

    #[test]
    fn test_protocol_templates() {
        assert_eq!(protocol_points("full-foot").unwrap().len(), 12);
        let right = protocol_points("right-foot").unwrap();
        assert_eq!(right.len(), 6);
        assert!(right.iter().all(|p| p.starts_with("Right ")));
        assert_eq!(protocol_points("left-foot").unwrap()[5], "Left Big Toe");
        assert_eq!(protocol_points("freestyle"), None);
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(PointSlot::FifthMt.vpt_threshold(), 10.0);
        assert_eq!(PointSlot::FirstMt.vpt_threshold(), 10.0);
        assert_eq!(PointSlot::Heel.vpt_threshold(), 5.0);
        assert_eq!(PointSlot::BigToe.vpt_threshold(), 5.0);
    }
}
