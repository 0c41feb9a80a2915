/*
 * integration_tests.rs
 * Copyright (c) 2025 Posit, PBC
 */

use doctemplate_logic::{render, Options, PartialSource, Value};
use std::collections::HashMap;
use std::rc::Rc;

fn obj(pairs: Vec<(&str, Value)>) -> Value {
    let mut m = HashMap::new();
    for (k, v) in pairs {
        m.insert(k.to_string(), v);
    }
    Value::Object(m)
}

#[test]
fn basic_interpolation() {
    let bindings = obj(vec![
        ("age", Value::Int(46)),
        ("name", obj(vec![("first", Value::from("Bob"))])),
    ]);
    let out = render(
        "{{name.first}} is {{age}} years old.",
        bindings,
        &Options::default(),
    )
    .unwrap();
    assert_eq!(out, "Bob is 46 years old.");
}

#[test]
fn escaped_delimiter_and_comment() {
    let bindings = obj(vec![
        ("age", Value::Int(46)),
        ("name", obj(vec![("first", Value::from("Bob"))])),
    ]);
    let out = render(
        "{{name.first}} is !{{age}} years old. {{! note }}",
        bindings,
        &Options::default(),
    )
    .unwrap();
    assert_eq!(out.trim_end(), "Bob is {{age}} years old.");
}

#[test]
fn list_tags_join_grammatically() {
    let bindings = obj(vec![
        ("name", Value::Array(vec![Value::from("bob")])),
        (
            "sells",
            Value::Array(vec![
                Value::from("burgers"),
                Value::from("sodas"),
                Value::from("fries"),
            ]),
        ),
        (
            "with",
            Value::Array(vec![Value::from("his wife"), Value::from("kids")]),
        ),
    ]);
    let out = render(
        "{{&name::capitalize}} sells {{&sells}} with {{&with}}.",
        bindings,
        &Options::default(),
    )
    .unwrap();
    assert_eq!(out, "Bob sells burgers, sodas, and fries with his wife and kids.");
}

#[test]
fn section_and_inverted_section() {
    let bindings = obj(vec![("married", Value::Bool(true)), ("haspets", Value::Bool(false))]);
    let out = render(
        "Bob is {{#married}}married{{/married}}{{^haspets}}no pets{{/haspets}}",
        bindings,
        &Options::default(),
    )
    .unwrap();
    assert_eq!(out, "Bob is marriedno pets");
}

#[test]
fn repeating_section_with_pass_to_function_self_reference() {
    let increment: doctemplate_logic::Callable =
        Rc::new(|this: &Value, _root: &Value| Ok(Value::Int(this.as_f64().unwrap_or(0.0) as i64 + 1)));
    let bindings = obj(vec![("n", Value::Int(1)), ("increment", Value::Function(increment))]);
    let out = render(
        "{{#n->increment}}{{#n->increment}}{{n}}{{/n}}{{/n}} -- {{n}}",
        bindings,
        &Options::default(),
    )
    .unwrap();
    assert_eq!(out, "3 -- 1");
}

#[test]
fn rerooting_resolves_per_item_inside_a_loop() {
    let fullname: doctemplate_logic::Callable = Rc::new(|this: &Value, _root: &Value| {
        let map = this.as_object().expect("fullname expects an object");
        let first = map.get("first").map(Value::to_plain_string).unwrap_or_default();
        let last = map.get("last").map(Value::to_plain_string).unwrap_or_default();
        Ok(Value::String(format!("{first} {last}")))
    });
    let age: doctemplate_logic::Callable = Rc::new(|this: &Value, _root: &Value| {
        let map = this.as_object().expect("age expects an object");
        Ok(map.get("age").cloned().unwrap_or(Value::Null))
    });

    let child = |first: &str, age_value: i64| {
        obj(vec![
            ("first", Value::from(first)),
            ("last", Value::from("Belcher")),
            ("age", Value::Int(age_value)),
        ])
    };
    let bindings = obj(vec![
        ("main", obj(vec![("first", Value::from("Bob")), ("last", Value::from("Belcher"))])),
        (
            "children",
            Value::Array(vec![child("Tina", 13), child("Gene", 11), child("Louise", 9)]),
        ),
        ("fullname", Value::Function(fullname)),
        ("age", Value::Function(age)),
    ]);
    let out = render(
        "{{main->fullname}}'s kids are:<br />{{#children}}{{children->fullname}} ({{children->age}} years old)<br />{{/children}}",
        bindings,
        &Options::default(),
    )
    .unwrap();
    assert_eq!(
        out,
        "Bob Belcher's kids are:<br />Tina Belcher (13 years old)<br />Gene Belcher (11 years old)<br />Louise Belcher (9 years old)<br />"
    );
}

#[test]
fn template_without_tags_passes_through_unchanged() {
    let out = render("just plain text, no tags here", Value::Null, &Options::default()).unwrap();
    assert_eq!(out, "just plain text, no tags here");
}

#[test]
fn repeating_section_renders_body_exactly_n_times() {
    let items = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
    let out = render(
        "{{#items}}x{{/items}}",
        obj(vec![("items", items)]),
        &Options::default(),
    )
    .unwrap();
    assert_eq!(out, "xxxx");
}

#[test]
fn partial_splices_in_named_template() {
    let mut options = Options::default();
    options
        .partials
        .insert("card".to_string(), PartialSource::from("[{{name}}]"));
    let out = render(
        "Header {{>card}} Footer",
        obj(vec![("name", Value::from("Jane"))]),
        &options,
    )
    .unwrap();
    assert_eq!(out, "Header [Jane] Footer");
}

#[test]
fn missing_binding_errors_when_configured_strict() {
    let mut options = Options::default();
    options.error_on_missing_tags = true;
    let err = render("{{nope}}", obj(vec![]), &options).unwrap_err();
    assert!(matches!(err, doctemplate_logic::TemplateError::MissingBinding { .. }));
}
