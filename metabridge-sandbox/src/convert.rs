//! Conversions between JSON values and Starlark values.

use serde_json::{Number, Value as JsonValue};
use starlark::values::dict::{AllocDict, DictRef};
use starlark::values::float::StarlarkFloat;
use starlark::values::list::{AllocList, ListRef};
use starlark::values::{Heap, Value, ValueLike};

/// Allocates a Starlark value mirroring a JSON value on the given heap.
///
/// The mapping is total: null becomes `None`, objects become dicts keyed by
/// their member names, arrays become lists.
pub fn json_to_starlark<'v>(heap: &'v Heap, value: &JsonValue) -> Value<'v> {
    match value {
        JsonValue::Null => Value::new_none(),
        JsonValue::Bool(flag) => Value::new_bool(*flag),
        JsonValue::Number(number) => alloc_number(heap, number),
        JsonValue::String(text) => heap.alloc(text.as_str()),
        JsonValue::Array(items) => {
            let converted: Vec<Value<'v>> =
                items.iter().map(|item| json_to_starlark(heap, item)).collect();
            heap.alloc(AllocList(converted))
        }
        JsonValue::Object(members) => {
            let converted: Vec<(Value<'v>, Value<'v>)> = members
                .iter()
                .map(|(name, member)| (heap.alloc(name.as_str()), json_to_starlark(heap, member)))
                .collect();
            heap.alloc(AllocDict(converted))
        }
    }
}

fn alloc_number<'v>(heap: &'v Heap, number: &Number) -> Value<'v> {
    if let Some(int) = number.as_i64() {
        heap.alloc(int)
    } else if let Some(int) = number.as_u64() {
        heap.alloc(int)
    } else if let Some(float) = number.as_f64() {
        heap.alloc(float)
    } else {
        // Unreachable with the default serde_json features.
        heap.alloc(number.to_string())
    }
}

/// Converts a Starlark value back into JSON.
///
/// Dict keys that are not strings are silently dropped, matching what a JSON
/// object can represent. Integers beyond the `i64` range and values with no
/// JSON counterpart (tuples, functions) degrade to their string rendering.
#[must_use]
pub fn starlark_to_json(value: Value) -> JsonValue {
    if value.is_none() {
        return JsonValue::Null;
    }
    if let Some(flag) = value.unpack_bool() {
        return JsonValue::Bool(flag);
    }
    if value.get_type() == "int" {
        let rendered = value.to_string();
        return match rendered.parse::<i64>() {
            Ok(int) => JsonValue::from(int),
            Err(_) => JsonValue::String(rendered),
        };
    }
    if let Some(float) = value.downcast_ref::<StarlarkFloat>() {
        return match Number::from_f64(float.0) {
            Some(number) => JsonValue::Number(number),
            // NaN and infinities have no JSON form.
            None => JsonValue::String(float.0.to_string()),
        };
    }
    if let Some(text) = value.unpack_str() {
        return JsonValue::String(text.to_owned());
    }
    if let Some(list) = ListRef::from_value(value) {
        return JsonValue::Array(list.iter().map(starlark_to_json).collect());
    }
    if let Some(dict) = DictRef::from_value(value) {
        let mut members = serde_json::Map::new();
        for (key, member) in dict.iter() {
            if let Some(name) = key.unpack_str() {
                members.insert(name.to_owned(), starlark_to_json(member));
            }
        }
        return JsonValue::Object(members);
    }

    JsonValue::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn round_trip(value: JsonValue) -> JsonValue {
        let heap = Heap::new();
        starlark_to_json(json_to_starlark(&heap, &value))
    }

    #[test]
    fn scalars_survive_a_round_trip() {
        for value in [
            json!(null),
            json!(true),
            json!(false),
            json!(0),
            json!(-17),
            json!(i64::MAX),
            json!(2.5),
            json!("hello"),
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn nested_structures_survive_a_round_trip() {
        let value = json!({
            "name": "issue",
            "labels": ["bug", "p1"],
            "meta": { "count": 3, "open": true, "parent": null }
        });
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn non_string_dict_keys_are_dropped() {
        let heap = Heap::new();
        let dict = heap.alloc(AllocDict([
            (heap.alloc(1i32), heap.alloc("one")),
            (heap.alloc("two"), heap.alloc(2i32)),
        ]));

        assert_eq!(starlark_to_json(dict), json!({ "two": 2 }));
    }

    #[test]
    fn tuples_degrade_to_their_rendering() {
        use starlark::values::tuple::AllocTuple;

        let heap = Heap::new();
        let tuple = heap.alloc(AllocTuple([heap.alloc(1i32), heap.alloc(2i32)]));
        assert_eq!(starlark_to_json(tuple), json!("(1, 2)"));
    }
}
