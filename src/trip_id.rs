//! Trip identity across the GTFS and TransitMaster id spaces.
//!
//! GTFS publishes split trips as `<id>_1`, `<id>_2` and overload vehicles as
//! `<id>-OL1`, `<id>-OL2` (sometimes a bare `-OL`). TransitMaster only knows
//! the bare serial number. The canonical id is the bare form and is the only
//! key used to join the two sources.

/// What a GTFS trip id carried on top of its canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TripSuffix {
    /// `_N`
    Split(u8),
    /// `-OL` or `-OLN`
    Overload(Option<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripIdentity {
    pub canonical: String,
    pub raw: String,
    pub suffixes: Vec<TripSuffix>,
}

impl TripIdentity {
    pub fn parse(raw: &str) -> Self {
        let mut suffixes = Vec::new();
        let mut rest = raw.trim();

        if let Some((head, ol)) = strip_overload(rest) {
            suffixes.push(TripSuffix::Overload(ol));
            rest = head;
        }
        if let Some((head, n)) = strip_split(rest) {
            suffixes.push(TripSuffix::Split(n));
            rest = head;
        }

        Self {
            canonical: rest.to_string(),
            raw: raw.to_string(),
            suffixes,
        }
    }

    pub fn is_overload(&self) -> bool {
        self.suffixes
            .iter()
            .any(|s| matches!(s, TripSuffix::Overload(_)))
    }
}

/// Strips a trailing `-OL\d?` and `_\d` from a trip id.
pub fn canonical_trip_id(raw: &str) -> String {
    TripIdentity::parse(raw).canonical
}

/// The GTFS static trip id a published id was scheduled under: overload
/// suffixes dropped, split suffixes kept.
pub fn scheduled_trip_id(raw: &str) -> String {
    let raw = raw.trim();
    strip_overload(raw).map_or(raw, |(head, _)| head).to_string()
}

/// TransitMaster pads route abbreviations with zeros (`"0742"`); GTFS does not.
pub fn tm_route_id(route_abbr: &str) -> String {
    let trimmed = route_abbr.trim().trim_start_matches('0');
    if trimmed.is_empty() && !route_abbr.trim().is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn strip_overload(id: &str) -> Option<(&str, Option<u8>)> {
    if let Some(head) = id.strip_suffix("-OL") {
        return non_empty(head).map(|h| (h, None));
    }
    let (head, digit) = split_last_digit(id)?;
    let head = head.strip_suffix("-OL")?;
    non_empty(head).map(|h| (h, Some(digit)))
}

fn strip_split(id: &str) -> Option<(&str, u8)> {
    let (head, digit) = split_last_digit(id)?;
    let head = head.strip_suffix('_')?;
    non_empty(head).map(|h| (h, digit))
}

fn split_last_digit(id: &str) -> Option<(&str, u8)> {
    let last = id.chars().last()?;
    let digit = last.to_digit(10)?;
    Some((&id[..id.len() - 1], digit as u8))
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_ids_are_unchanged() {
        assert_eq!(canonical_trip_id("68245216"), "68245216");
        assert_eq!(canonical_trip_id("70040149"), "70040149");
        assert!(TripIdentity::parse("68245216").suffixes.is_empty());
    }

    #[test]
    fn test_overload_suffixes() {
        assert_eq!(canonical_trip_id("68245216-OL1"), "68245216");
        assert_eq!(canonical_trip_id("68245216-OL2"), "68245216");
        assert_eq!(canonical_trip_id("68245216-OL"), "68245216");

        let identity = TripIdentity::parse("68245216-OL1");
        assert!(identity.is_overload());
        assert_eq!(identity.raw, "68245216-OL1");
        assert_eq!(identity.suffixes, vec![TripSuffix::Overload(Some(1))]);
    }

    #[test]
    fn test_split_suffixes() {
        assert_eq!(canonical_trip_id("61234567_1"), "61234567");
        assert_eq!(canonical_trip_id("61234567_2"), "61234567");
        assert!(!TripIdentity::parse("61234567_2").is_overload());
    }

    #[test]
    fn test_scheduled_trip_id_keeps_split_suffix() {
        assert_eq!(scheduled_trip_id("61234567_2-OL1"), "61234567_2");
        assert_eq!(scheduled_trip_id("61234567_2"), "61234567_2");
        assert_eq!(scheduled_trip_id("68245216-OL"), "68245216");
        assert_eq!(scheduled_trip_id("68245216"), "68245216");
    }

    #[test]
    fn test_split_then_overload() {
        let identity = TripIdentity::parse("61234567_1-OL2");
        assert_eq!(identity.canonical, "61234567");
        assert_eq!(
            identity.suffixes,
            vec![TripSuffix::Overload(Some(2)), TripSuffix::Split(1)]
        );
    }

    #[test]
    fn test_only_one_trailing_digit_is_a_suffix() {
        // `_12` is not a split suffix, the id is left alone
        assert_eq!(canonical_trip_id("61234567_12"), "61234567_12");
        assert_eq!(canonical_trip_id("ADDED-1"), "ADDED-1");
    }

    #[test]
    fn test_tm_route_ids_lose_leading_zeros() {
        assert_eq!(tm_route_id("0742"), "742");
        assert_eq!(tm_route_id("SL1"), "SL1");
        assert_eq!(tm_route_id("000"), "0");
    }

    #[test]
    fn test_suffix_alone_is_not_stripped() {
        assert_eq!(canonical_trip_id("-OL1"), "-OL1");
        assert_eq!(canonical_trip_id("_1"), "_1");
    }
}
