use proptest::prelude::*;
use serde_json::json;
use simple_lang::{DefaultExchange, SimpleLanguage, SimpleOptions};

proptest! {
    #[test]
    fn plain_text_renders_unchanged(text in "[a-zA-Z0-9 ,.]{0,40}") {
        let lang = SimpleLanguage::new();
        let mut ex = DefaultExchange::new();
        let out = lang.parse_expression(&text).unwrap().evaluate_string(&mut ex).unwrap();
        prop_assert_eq!(out, text);
    }

    #[test]
    fn range_includes_both_bounds(from in 0i64..100, span in 0i64..100, value in 0i64..300) {
        let to = from + span;
        let lang = SimpleLanguage::new();
        let mut ex = DefaultExchange::new().with_header("v", value);
        let p = lang.parse_predicate(&format!("${{header.v}} range '{from}..{to}'")).unwrap();
        prop_assert_eq!(p.matches(&mut ex).unwrap(), from <= value && value <= to);
    }

    #[test]
    fn elvis_falls_back_on_empty(value in "[a-z]{0,8}") {
        let lang = SimpleLanguage::new();
        let mut ex = DefaultExchange::new().with_header("v", value.clone());
        let out = lang
            .parse_expression("${header.v} ?: fallback")
            .unwrap()
            .evaluate_value(&mut ex)
            .unwrap();
        let expected = if value.is_empty() { json!("fallback") } else { json!(value) };
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn cached_and_uncached_agree(n in -1000i64..1000, threshold in -1000i64..1000) {
        let cached = SimpleLanguage::new();
        let uncached = SimpleLanguage::with_options(SimpleOptions::default().without_cache());
        let text = format!("${{header.n}} >= {threshold} && ${{header.n}} != 0");
        let mut ex = DefaultExchange::new().with_header("n", n);
        let a = cached.parse_predicate(&text).unwrap().matches(&mut ex).unwrap();
        let b = uncached.parse_predicate(&text).unwrap().matches(&mut ex).unwrap();
        prop_assert_eq!(a, b);
        prop_assert_eq!(a, n >= threshold && n != 0);
    }
}
