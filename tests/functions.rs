use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use simple_lang::{DefaultExchange, SimpleLanguage};

fn eval(text: &str, ex: &mut DefaultExchange) -> Value {
    SimpleLanguage::new()
        .parse_expression(text)
        .unwrap()
        .evaluate_value(ex)
        .unwrap()
}

#[test]
fn test_message_functions() {
    let mut ex = DefaultExchange::new()
        .with_body(json!({"items": [1, 2, 3]}))
        .with_header("h", "v")
        .with_property("p", 1)
        .with_route("route-1", Some("step-1"));
    assert_eq!(eval("${body.items[last]}", &mut ex), json!(3));
    assert_eq!(eval("${in.body.items.size()}", &mut ex), json!(3));
    assert_eq!(eval("${headers}", &mut ex), json!({"h": "v"}));
    assert_eq!(eval("${headerAs(h, String)}", &mut ex), json!("v"));
    assert_eq!(eval("${exchangeProperty:p}", &mut ex), json!(1));
    assert_eq!(eval("${camelId}", &mut ex), json!("simple"));
    assert_eq!(eval("${camelContext.name}", &mut ex), json!("simple"));
    assert_eq!(eval("${routeId}/${stepId}", &mut ex), json!("route-1/step-1"));
    assert!(eval("${messageTimestamp}", &mut ex).is_i64());
    assert!(eval("${threadName}", &mut ex).is_string());
}

#[test]
fn test_system_lookups() {
    let mut ex = DefaultExchange::new().with_system_property("app.mode", "test");
    assert_eq!(eval("${sys.app.mode}", &mut ex), json!("test"));
    assert_eq!(eval("${sys.os.name}", &mut ex), json!(std::env::consts::OS));
    assert_eq!(eval("${env.SIMPLE_LANG_SURELY_UNSET_VARIABLE}", &mut ex), Value::Null);
    let home = ["HOME", "USERPROFILE"]
        .iter()
        .find_map(|k| std::env::var(k).ok())
        .map_or(Value::Null, Value::String);
    assert_eq!(eval("${sys.user.home}", &mut ex), home);
}

#[test]
fn test_file_and_date_functions() {
    let mut ex = DefaultExchange::new()
        .with_header("CamelFileName", "data/in/report.tar.gz")
        .with_header("CamelFileLastModified", 86_400_000);
    assert_eq!(eval("${file:name.ext.single}", &mut ex), json!("gz"));
    assert_eq!(eval("${file:onlyname}", &mut ex), json!("report.tar.gz"));
    assert_eq!(eval("${date:file:yyyy-MM-dd}", &mut ex), json!("1970-01-02"));
    assert_eq!(eval("${date:file-1d:yyyy-MM-dd}", &mut ex), json!("1970-01-01"));
    let year = eval("${date:now:yyyy}", &mut ex);
    assert_eq!(year.as_str().map(str::len), Some(4));
}

#[test]
fn test_date_offset_overflow_is_an_error() {
    let lang = SimpleLanguage::new();
    let e = lang.parse_expression("${date:now+100000000d:yyyy}").unwrap();
    let err = e.evaluate_value(&mut DefaultExchange::new()).unwrap_err();
    assert!(err.to_string().contains("Date offset out of range"));
    assert!(lang.parse_expression("${date:now-9223372036854775807:yyyy}").is_err());
}

#[test]
fn test_lookups_and_helpers() {
    let mut ex = DefaultExchange::new()
        .with_body(json!(["x", "y", "z"]))
        .with_bean("greeter", json!({"greeting": "hi"}))
        .with_placeholder("region", "eu");
    assert_eq!(eval("${bean:greeter::greeting}", &mut ex), json!("hi"));
    assert_eq!(eval("${bean:greeter?method=greeting}", &mut ex), json!("hi"));
    assert_eq!(eval("${properties:region}", &mut ex), json!("eu"));
    assert_eq!(eval("${skip(1)}", &mut ex), json!(["y", "z"]));
    assert_eq!(eval("${collate(2)}", &mut ex), json!([["x", "y"], ["z"]]));
    assert_eq!(eval("${not(false)}", &mut ex), json!(true));
    assert_eq!(eval("${isEmpty()}", &mut ex), json!(false));
}

#[test]
fn test_strict_and_lenient_resolution() {
    let lang = SimpleLanguage::new();
    assert!(lang.resolve_function("header.x", true).unwrap().is_some());
    assert!(lang.resolve_function("nonsense here", false).unwrap().is_none());
    assert!(lang.parse_expression("${nonsense}").is_err());
}
