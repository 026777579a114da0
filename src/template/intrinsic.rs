// CloudFormation intrinsic functions

use serde_json::{json, Value};

/// `{ "Ref": logical_id }`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{ "Fn::GetAtt": [logical_id, attribute] }`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::Join": ["", parts] }`
pub fn join(parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": ["", parts] })
}

/// Render a tag map as a CloudFormation `Tags` list
pub fn tags(tags: &std::collections::BTreeMap<String, String>) -> Value {
    Value::Array(
        tags.iter()
            .map(|(key, value)| json!({ "Key": key, "Value": value }))
            .collect(),
    )
}

/// Collect every logical id referenced by `Ref` or `Fn::GetAtt`
///
/// Pseudo parameters (`AWS::Region`, ...) are skipped.
pub(crate) fn referenced_ids(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                push_target(target, out);
            }
            if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(target)) = args.first() {
                    push_target(target, out);
                }
            }
            for nested in map.values() {
                referenced_ids(nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                referenced_ids(item, out);
            }
        }
        _ => {}
    }
}

fn push_target(target: &str, out: &mut Vec<String>) {
    if !target.starts_with("AWS::") {
        out.push(target.to_string());
    }
}
