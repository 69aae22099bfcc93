use serde_json::Value;

/// The primary type of a property spec and whether it admits `null`.
///
/// Three encodings mean the same thing:
/// `{"type": "string"}` (not nullable), `{"type": ["string", "null"]}`, and
/// `{"anyOf": [{"type": "string"}, {"type": "null"}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeMeta {
    pub primary: Option<String>,
    pub nullable: bool,
}

impl TypeMeta {
    pub fn parse(spec: &Value) -> Self {
        match spec.get("type") {
            Some(Value::String(t)) if t == "null" => Self {
                primary: None,
                nullable: true,
            },
            Some(Value::String(t)) => Self {
                primary: Some(t.clone()),
                nullable: false,
            },
            Some(Value::Array(types)) => {
                let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                Self {
                    primary: names.iter().find(|t| **t != "null").map(|t| t.to_string()),
                    nullable: names.contains(&"null"),
                }
            }
            _ => Self::parse_union(spec),
        }
    }

    fn parse_union(spec: &Value) -> Self {
        let Some(branches) = union_branches(spec) else {
            return Self::default();
        };

        let metas: Vec<TypeMeta> = branches.iter().map(TypeMeta::parse).collect();
        Self {
            primary: metas.iter().find_map(|m| m.primary.clone()),
            nullable: metas.iter().any(|m| m.nullable),
        }
    }

    pub fn is(&self, type_name: &str) -> bool {
        self.primary.as_deref() == Some(type_name)
    }
}

/// For an `anyOf`/`oneOf` union, the first branch that is not the `null` type.
/// Plain specs are returned unchanged.
pub fn value_branch(spec: &Value) -> &Value {
    union_branches(spec)
        .and_then(|branches| {
            branches
                .iter()
                .find(|branch| TypeMeta::parse(branch).primary.is_some())
        })
        .unwrap_or(spec)
}

fn union_branches(spec: &Value) -> Option<&Vec<Value>> {
    spec.get("anyOf")
        .or_else(|| spec.get("oneOf"))
        .and_then(Value::as_array)
}
