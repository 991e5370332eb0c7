use pretty_assertions::assert_eq;
use serde_json::json;
use simple_lang::{DefaultExchange, Exchange, SimpleError, SimpleLanguage};

fn exchange() -> DefaultExchange {
    DefaultExchange::new()
        .with_body(json!({"name": "Camel", "tags": ["a", "b"]}))
        .with_header("count", 7)
        .with_header("name", "Alice")
        .with_header("text", "Hello World")
        .with_header("code", "123")
        .with_header("level", "gold")
}

fn check(text: &str) -> bool {
    SimpleLanguage::new()
        .parse_predicate(text)
        .unwrap()
        .matches(&mut exchange())
        .unwrap()
}

fn eval(text: &str) -> serde_json::Value {
    SimpleLanguage::new()
        .parse_expression(text)
        .unwrap()
        .evaluate_value(&mut exchange())
        .unwrap()
}

#[test]
fn test_equality_and_ordering() {
    assert!(check("${header.count} == 7"));
    assert!(check("${header.count} == '7'"));
    assert!(check("${header.count} > 5"));
    assert!(check("${header.count} >= 7"));
    assert!(check("${header.count} < 10"));
    assert!(!check("${header.count} <= 6"));
    assert!(check("${header.name} != 'Bob'"));
    assert!(check("${header.name} =~ 'alice'"));
    assert!(!check("${header.name} !=~ 'ALICE'"));
    assert!(!check("${header.missing} > 1"));
}

#[test]
fn test_containment_and_text() {
    assert!(check("${header.text} contains 'World'"));
    assert!(check("${header.text} not contains 'Moon'"));
    assert!(check("${header.text} !contains 'Moon'"));
    assert!(check("${header.text} ~~ 'hello'"));
    assert!(!check("${header.text} !~~ 'HELLO'"));
    assert!(check("${header.name} startsWith 'Al'"));
    assert!(check("${header.name} starts with 'Al'"));
    assert!(check("${header.name} endsWith 'ce'"));
    assert!(check("${header.name} ends with 'ce'"));
    assert!(check("${body.tags} contains 'b'"));
}

#[test]
fn test_membership_ranges_regex_and_types() {
    assert!(check("${header.level} in 'gold,silver'"));
    assert!(check("${header.level} not in 'bronze,silver'"));
    assert!(check("${header.level} !in 'bronze'"));
    assert!(check("${header.count} range '1..10'"));
    assert!(check("${header.count} !range '8..10'"));
    assert!(check("${header.code} regex '[0-9]{3}'"));
    assert!(!check("${header.code} regex '[0-9]{2}'"));
    assert!(check("${header.code} not regex '[a-z]+'"));
    assert!(check("${header.name} is 'String'"));
    assert!(check("${header.count} is Long"));
    assert!(check("${body} is Map"));
    assert!(check("${header.count} !is String"));
}

#[test]
fn test_unquoted_range_bounds() {
    let lang = SimpleLanguage::new();
    let adult = lang.parse_predicate("${header.age} range 18..30").unwrap();
    for (age, expected) in [(17, false), (18, true), (30, true), (31, false)] {
        let mut ex = DefaultExchange::new().with_header("age", age);
        assert_eq!(adult.matches(&mut ex).unwrap(), expected, "age {age}");
    }
    let err = lang.parse_predicate("${header.age} range 18-30").unwrap_err();
    assert!(matches!(err, SimpleError::InvalidRange { ref value, index: 20 } if value == "18-30"));
}

#[test]
fn test_logical_operators() {
    assert!(check("${header.count} > 5 && ${header.name} == 'Alice'"));
    assert!(check("${header.count} > 5 and ${header.name} == 'Alice'"));
    assert!(check("${header.count} > 50 || ${header.name} == 'Alice'"));
    assert!(!check("${header.count} > 50 or ${header.name} == 'Bob'"));
    assert!(check("${header.count} > 50 && ${header.count} > 60 || ${header.code} == 123"));
}

#[test]
fn test_ternary_and_elvis() {
    assert_eq!(eval("${header.count} > 5 ? big : small"), json!("big"));
    assert_eq!(eval("${header.count} > 50 ? 'big' : 'small'"), json!("small"));
    assert_eq!(eval("${header.count > 5 ? 'big' : 'small'}"), json!("big"));
    assert_eq!(eval("${header.missing} ?: 'fallback'"), json!("fallback"));
    assert_eq!(eval("${header.name} ?: 'fallback'"), json!("Alice"));
}

#[test]
fn test_chain_and_assignment() {
    assert_eq!(eval("${body.name} -> ${uppercase()}"), json!("CAMEL"));
    assert_eq!(eval("${header.missing} ?-> ${uppercase()}"), serde_json::Value::Null);

    let lang = SimpleLanguage::new();
    let mut ex = exchange();
    let assign = lang.parse_expression("$greeting := ${header.name}").unwrap();
    assert_eq!(assign.evaluate_value(&mut ex).unwrap(), serde_json::Value::Null);
    assert_eq!(ex.variable("greeting"), Some(&json!("Alice")));
    let read = lang.parse_expression("Hi ${variable.greeting}").unwrap();
    assert_eq!(read.evaluate_string(&mut ex).unwrap(), "Hi Alice");
}

#[test]
fn test_chain_restores_the_body() {
    let lang = SimpleLanguage::new();
    let mut ex = exchange();
    let before = ex.body().clone();
    lang.parse_expression("${header.name} -> ${lowercase()}")
        .unwrap()
        .evaluate_value(&mut ex)
        .unwrap();
    assert_eq!(ex.body(), &before);
}
