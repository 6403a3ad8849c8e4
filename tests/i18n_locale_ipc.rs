mod common;

use common::Sidecar;
use serde_json::json;

#[test]
fn locale_persists_in_the_workspace() {
    let (mut s, workspace) = Sidecar::with_workspace("edgrade-i18n-persist");
    assert_eq!(s.ok("i18n.getLocale", json!({}))["locale"], "en");

    s.ok("i18n.setLocale", json!({ "locale": "km" }));
    assert_eq!(s.ok("i18n.getLocale", json!({}))["locale"], "kh");
    assert_eq!(
        s.err_code("i18n.setLocale", json!({ "locale": "fr" })),
        "bad_params"
    );
    drop(s);

    // A fresh process on the same workspace keeps the choice.
    let ws = workspace.to_string_lossy().to_string();
    let mut s = Sidecar::spawn_with(&["--workspace", &ws]);
    assert_eq!(s.ok("i18n.getLocale", json!({}))["locale"], "kh");
    let text = s.ok("i18n.translate", json!({ "key": "gradeGood" }));
    assert_eq!(text["text"], "ល្អ");
}

#[test]
fn translate_falls_back_to_the_key_and_honours_explicit_locale() {
    let mut s = Sidecar::spawn();
    let en = s.ok("i18n.translate", json!({ "key": "physics" }));
    assert_eq!(en["locale"], "en");
    assert_eq!(en["text"], "Physics");

    let kh = s.ok("i18n.translate", json!({ "key": "gradePoor", "locale": "kh" }));
    assert_eq!(kh["text"], "ខ្សោយ");

    let missing = s.ok("i18n.translate", json!({ "key": "music" }));
    assert_eq!(missing["text"], "music");

    let en_all = s.ok("i18n.messages", json!({ "locale": "en" }));
    let kh_all = s.ok("i18n.messages", json!({ "locale": "kh" }));
    let en_keys: Vec<&String> = en_all["messages"].as_object().expect("messages").keys().collect();
    let kh_keys: Vec<&String> = kh_all["messages"].as_object().expect("messages").keys().collect();
    assert_eq!(en_keys, kh_keys);
    assert_eq!(
        s.err_code("i18n.messages", json!({ "locale": "de" })),
        "bad_params"
    );
}
