mod common;

use serde_json::json;

use statewatch::{compile, FilterSpec, Membership, StateChangeEvent, StateSnapshot, StateValue};

use common::{capture_logger, change};

fn spec(v: serde_json::Value) -> FilterSpec {
    FilterSpec::from_json(v).unwrap()
}

fn sample_events() -> Vec<StateChangeEvent> {
    vec![
        change("sensor.temp", 18.0, 25.0),
        change("sensor.temp", 25.0, 25.0),
        change("hm.0.switch", false, true),
        change("hm.0.label", "off", "on"),
        StateChangeEvent::new("empty", StateSnapshot::neutral(), StateSnapshot::neutral()),
        change("hm.0.light", 0.0, 1.0)
            .with_enum_ids(["enum.rooms.Kitchen"])
            .with_channel("hm.0.ch", "Channel")
            .with_device("hm.0", "Dimmer"),
    ]
}

#[test]
fn filter_without_recognized_keys_matches_everything() {
    for raw in [json!({}), json!({"unknown": 1}), json!({"logic": "or"}), json!({"logic": "and", "x": [1, 2]})] {
        let predicate = compile(&spec(raw.clone()));
        for event in sample_events() {
            assert!(predicate.matches(&event), "{raw} should match {}", event.id);
        }
    }
}

#[test]
fn change_eq_and_ne_on_unchanged_value() {
    let eq = compile(&spec(json!({"change": "eq"})));
    let ne = compile(&spec(json!({"change": "ne"})));
    for value in [
        StateValue::Null,
        StateValue::from(0),
        StateValue::from(21.5),
        StateValue::from(true),
        StateValue::from("on"),
        StateValue::from(""),
    ] {
        let event = change("x", value.clone(), value.clone());
        assert!(eq.matches(&event), "eq on {value}");
        assert!(!ne.matches(&event), "ne on {value}");
    }
}

#[test]
fn change_eq_is_strict() {
    let eq = compile(&spec(json!({"change": "eq"})));
    assert!(!eq.matches(&change("x", 1, "1")));
    assert!(!eq.matches(&change("x", StateValue::Null, 0)));
}

#[test]
fn unrecognized_change_operator_always_matches() {
    let predicate = compile(&spec(json!({"change": "sideways"})));
    for event in sample_events() {
        assert!(predicate.matches(&event));
    }
    let any = compile(&spec(json!({"change": "any"})));
    assert!(any.matches(&change("x", 1, 1)));
}

#[test]
fn contradictory_numeric_bounds_never_match() {
    let predicate = compile(&spec(json!({"valGt": 10, "valLt": 5})));
    for v in [-100.0, 0.0, 5.0, 7.5, 10.0, 100.0] {
        assert!(!predicate.matches(&change("x", 0.0, v)));
    }
    for event in sample_events() {
        assert!(!predicate.matches(&event));
    }
}

#[test]
fn sensor_threshold_scenario() {
    let predicate = compile(&spec(json!({"id": "sensor.temp", "valGt": 20})));

    assert!(predicate.matches(&change("sensor.temp", 0, 25)));
    assert!(!predicate.matches(&change("sensor.temp", 0, 18)));
    assert!(!predicate.matches(&change("sensor.other", 0, 25)));
}

#[test]
fn absent_value_compares_as_zero() {
    let absent = StateChangeEvent::new("sensor.temp", StateSnapshot::neutral(), StateSnapshot::neutral());
    assert!(absent.new_state.value.is_null());

    // Absent behaves exactly like 0 in every ordered comparison.
    let zero = change("sensor.temp", 0, 0);
    for raw in [
        json!({"id": "sensor.temp", "valGt": 20}),
        json!({"valGt": -1}),
        json!({"valGe": 0}),
        json!({"valLt": 20}),
        json!({"valLe": 0}),
        json!({"valLt": 0}),
        json!({"oldValGe": 0}),
        json!({"oldValGt": 0}),
    ] {
        let predicate = compile(&spec(raw.clone()));
        assert_eq!(predicate.matches(&absent), predicate.matches(&zero), "{raw}");
    }

    assert!(!compile(&spec(json!({"id": "sensor.temp", "valGt": 20}))).matches(&absent));
    assert!(compile(&spec(json!({"valLt": 20}))).matches(&absent));
    assert!(compile(&spec(json!({"valGe": 0, "valLe": 0}))).matches(&absent));
}

#[test]
fn absent_timestamps_compare_as_zero() {
    let absent = StateChangeEvent::new("x", StateSnapshot::neutral(), StateSnapshot::neutral());
    assert!(compile(&spec(json!({"tsLt": 1}))).matches(&absent));
    assert!(compile(&spec(json!({"oldLcLe": 0}))).matches(&absent));
    assert!(!compile(&spec(json!({"lcGt": 0}))).matches(&absent));
}

#[test]
fn kitchen_enum_scenario() {
    let (logger, logs) = capture_logger();
    let predicate = compile(&spec(json!({"enumId": ["enum.rooms.Kitchen"]})));

    let member = change("hm.0.light", 0, 1).with_enum_ids(["enum.rooms.Kitchen", "enum.functions.Light"]);
    let empty = change("hm.0.light", 0, 1).with_enum_ids(Vec::<String>::new());
    let absent = change("hm.0.light", 0, 1);

    logger.scope(|| {
        assert!(predicate.matches(&member));
        assert!(!predicate.matches(&empty));
    });
    assert!(!logs.contents().contains("WARN"));

    logger.scope(|| assert!(!predicate.matches(&absent)));
    let out = logs.contents();
    assert!(out.contains("WARN"), "expected a warning, got: {out}");
    assert!(out.contains("enumId"));
    assert!(out.contains("hm.0.light"));
}

#[test]
fn malformed_enum_metadata_fails_closed() {
    let (logger, logs) = capture_logger();
    let predicate = compile(&spec(json!({"enumName": "Kitchen"})));

    let mut event = change("hm.0.light", 0, 1);
    event.enum_names = Some(Membership::Malformed(json!({"en": "Kitchen"})));

    logger.scope(|| assert!(!predicate.matches(&event)));
    assert!(logs.contents().contains("not a list"));
}

#[test]
fn enum_patterns_literal_list_and_regex() {
    let event = change("hm.0.light", 0, 1)
        .with_enum_ids(["enum.rooms.Kitchen", "enum.functions.Light"])
        .with_enum_names(["Kitchen", "Light"]);

    assert!(compile(&spec(json!({"enumId": "enum.functions.Light"}))).matches(&event));
    assert!(!compile(&spec(json!({"enumId": "enum.functions"}))).matches(&event));
    assert!(compile(&spec(json!({"enumId": "/^enum\\.rooms\\./"}))).matches(&event));
    assert!(compile(&spec(json!({"enumName": ["Bath", "Light"]}))).matches(&event));
    assert!(!compile(&spec(json!({"enumName": ["Bath"]}))).matches(&event));
    assert!(compile(&spec(json!({"enumName": "/kitch/i"}))).matches(&event));
}

#[test]
fn identity_fields_literal_regex_and_list() {
    let event = sample_events().pop().unwrap();
    assert!(compile(&spec(json!({"id": "hm.0.light"}))).matches(&event));
    assert!(compile(&spec(json!({"id": ["a", "hm.0.light"]}))).matches(&event));
    assert!(compile(&spec(json!({"id": "/light$/"}))).matches(&event));
    assert!(compile(&spec(json!({"channelId": "hm.0.ch", "deviceName": "/dim/i"}))).matches(&event));
    assert!(!compile(&spec(json!({"name": "/.*/"}))).matches(&event));
}

#[test]
fn origin_filters_and_negation() {
    let mut event = change("x", 0, 1);
    event.new_state.origin = "system.adapter.javascript.0".to_string();

    assert!(compile(&spec(json!({"from": "system.adapter.javascript.0"}))).matches(&event));
    assert!(!compile(&spec(json!({"fromNe": "system.adapter.javascript.0"}))).matches(&event));
    assert!(compile(&spec(json!({"fromNe": "/hm-rpc/"}))).matches(&event));
    // Old snapshot carries no origin: positive filters fail, negated ones pass.
    assert!(!compile(&spec(json!({"oldFrom": "/.*/"}))).matches(&event));
    assert!(compile(&spec(json!({"oldFromNe": "anything"}))).matches(&event));
}

#[test]
fn value_equality_is_strict_and_null_aware() {
    let event = change("x", StateValue::Null, 1);
    assert!(compile(&spec(json!({"val": 1}))).matches(&event));
    assert!(!compile(&spec(json!({"val": "1"}))).matches(&event));
    assert!(compile(&spec(json!({"valNe": "1"}))).matches(&event));
    assert!(compile(&spec(json!({"oldVal": null}))).matches(&event));
    assert!(!compile(&spec(json!({"oldValNe": null}))).matches(&event));
}

#[test]
fn ack_and_quality() {
    let mut event = change("x", 0, 1);
    event.new_state.acknowledged = true;
    event.new_state.quality = Some(0);

    assert!(compile(&spec(json!({"ack": true}))).matches(&event));
    assert!(compile(&spec(json!({"ack": "true"}))).matches(&event));
    assert!(!compile(&spec(json!({"ack": "false"}))).matches(&event));
    assert!(compile(&spec(json!({"oldAck": false}))).matches(&event));
    assert!(compile(&spec(json!({"q": 0}))).matches(&event));
    assert!(compile(&spec(json!({"oldQ": "*"}))).matches(&event));
    assert!(!compile(&spec(json!({"oldQ": 0}))).matches(&event));
}

#[test]
fn or_logic_combines_any_field() {
    let predicate = compile(&spec(json!({"logic": "or", "val": 5, "id": "/^sensor\\./"})));
    assert!(predicate.matches(&change("sensor.temp", 0, 1)));
    assert!(predicate.matches(&change("other", 0, 5)));
    assert!(!predicate.matches(&change("other", 0, 1)));
}

#[test]
fn filter_round_trips_through_wire_form() {
    let raw = json!({
        "logic": "and",
        "id": "/^hm-rpc\\.\\d+\\./i",
        "enumName": ["Kitchen", "Bath"],
        "val": null,
        "oldValGe": 1.5,
        "tsGt": 1_700_000_000_000_i64,
        "ack": true,
        "q": "*",
        "change": "ne"
    });
    let parsed = spec(raw.clone());
    assert_eq!(parsed.to_json(), raw);
    assert_eq!(spec(parsed.to_json()), parsed);
}
