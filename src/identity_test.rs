use super::*;

#[test]
fn new_session_keeps_display_name() {
    let session = Session::new("Mark Scout");
    assert_eq!(session.display_name(), "Mark Scout");
}

#[test]
fn new_session_id_is_uuid() {
    let session = Session::new("a");
    assert!(Uuid::parse_str(session.id().as_str()).is_ok());
}

#[test]
fn two_sessions_get_distinct_ids() {
    let a = Session::new("a");
    let b = Session::new("a");
    assert_ne!(a.id(), b.id());
}

#[test]
fn identity_is_stable_across_reads() {
    let session = Session::new("a");
    let id = session.id().clone();
    let color = session.color().to_owned();
    for _ in 0..10 {
        assert_eq!(session.id(), &id);
        assert_eq!(session.color(), color);
    }
}

#[test]
fn random_color_is_hsl_with_fixed_saturation_and_lightness() {
    for _ in 0..50 {
        let color = random_color();
        assert!(color.starts_with("hsl("), "unexpected color {color}");
        assert!(color.ends_with(", 100%, 70%)"), "unexpected color {color}");
        let hue: u16 = color
            .trim_start_matches("hsl(")
            .split(',')
            .next()
            .and_then(|h| h.parse().ok())
            .expect("hue should parse");
        assert!(hue < 360);
    }
}

#[test]
fn hsl_color_wraps_hue() {
    assert_eq!(hsl_color(0), "hsl(0, 100%, 70%)");
    assert_eq!(hsl_color(360), "hsl(0, 100%, 70%)");
    assert_eq!(hsl_color(212), "hsl(212, 100%, 70%)");
}

#[test]
fn from_parts_round_trips_fields() {
    let session = Session::from_parts(ParticipantId::new("7"), "Irving", "hsl(1, 100%, 70%)");
    assert_eq!(session.id().as_str(), "7");
    assert_eq!(session.display_name(), "Irving");
    assert_eq!(session.color(), "hsl(1, 100%, 70%)");
}
