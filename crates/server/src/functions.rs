//! Built-in computations selectable by name from `[function]`.

use std::cmp::Ordering;

use serde_json::Value;

use rowgate_core::RowArgs;
use rowgate_gateway::{CallContext, ComputeError, Computation};

/// Names accepted by [`builtin`].
pub const BUILTINS: &[&str] = &["echo", "upper", "dense_rank"];

/// Look up a built-in computation by name.
pub fn builtin(name: &str) -> Option<Computation> {
    match name {
        "echo" => Some(Computation::per_row(echo)),
        "upper" => Some(Computation::per_row(upper)),
        "dense_rank" => Some(Computation::batch(dense_rank)),
        _ => None,
    }
}

/// Returns the first argument unchanged.
fn echo(args: RowArgs, _ctx: &CallContext) -> Result<Value, ComputeError> {
    Ok(args.get(0).cloned().unwrap_or(Value::Null))
}

/// Upper-cases a string argument. `NULL` stays `NULL`.
fn upper(args: RowArgs, _ctx: &CallContext) -> Result<Value, ComputeError> {
    match args.get(0) {
        None | Some(Value::Null) => Ok(Value::Null),
        Some(Value::String(s)) => Ok(Value::String(s.to_uppercase())),
        Some(other) => Err(ComputeError::invalid(format!(
            "upper expects a string argument, got {}",
            type_name(other)
        ))),
    }
}

/// Dense rank (1-based) of each row's first argument across the batch.
/// `NULL` sorts first.
fn dense_rank(rows: Vec<RowArgs>, _ctx: &CallContext) -> Result<Vec<Value>, ComputeError> {
    let keys: Vec<Value> = rows
        .iter()
        .map(|r| r.get(0).cloned().unwrap_or(Value::Null))
        .collect();

    let mut distinct: Vec<&Value> = keys.iter().collect();
    distinct.sort_by(|a, b| compare(a, b));
    distinct.dedup_by(|a, b| compare(&**a, &**b) == Ordering::Equal);

    Ok(keys
        .iter()
        .map(|k| {
            distinct
                .binary_search_by(|d| compare(d, k))
                .map_or(Value::Null, |idx| Value::from(idx + 1))
        })
        .collect())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_order(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_order(a)
            .cmp(&type_order(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rowgate_gateway::RuntimeContext;
    use serde_json::json;

    use super::*;

    fn ctx() -> CallContext {
        CallContext {
            request_id: "r".into(),
            user: "alice".into(),
            user_project: None,
            user_defined_context: None,
            runtime: Arc::new(RuntimeContext::default()),
        }
    }

    fn rows(values: &[Value]) -> Vec<RowArgs> {
        values.iter().map(|v| RowArgs::new(vec![v.clone()])).collect()
    }

    #[test]
    fn every_listed_builtin_exists() {
        for name in BUILTINS {
            assert!(builtin(name).is_some(), "{name} should resolve");
        }
        assert!(builtin("nope").is_none());
    }

    #[tokio::test]
    async fn echo_returns_first_argument() {
        let c = builtin("echo").unwrap();
        let replies = c.run(rows(&[json!(1), json!("a"), json!(null)]), &ctx()).await.unwrap();
        assert_eq!(replies, vec![json!(1), json!("a"), json!(null)]);
    }

    #[tokio::test]
    async fn upper_validates_input() {
        let c = builtin("upper").unwrap();
        let replies = c.run(rows(&[json!("abc"), json!(null)]), &ctx()).await.unwrap();
        assert_eq!(replies, vec![json!("ABC"), json!(null)]);

        let err = c.run(rows(&[json!("x"), json!(5)]), &ctx()).await.unwrap_err();
        assert_eq!(
            err,
            ComputeError::invalid("upper expects a string argument, got number")
        );
    }

    #[tokio::test]
    async fn dense_rank_ranks_across_batch() {
        let c = builtin("dense_rank").unwrap();
        let replies = c
            .run(rows(&[json!(30), json!(10), json!(30), json!(20), json!(null)]), &ctx())
            .await
            .unwrap();
        assert_eq!(replies, vec![json!(4), json!(2), json!(4), json!(3), json!(1)]);
    }

    #[tokio::test]
    async fn dense_rank_of_strings() {
        let c = builtin("dense_rank").unwrap();
        let replies = c
            .run(rows(&[json!("b"), json!("a"), json!("b")]), &ctx())
            .await
            .unwrap();
        assert_eq!(replies, vec![json!(2), json!(1), json!(2)]);
    }

    #[test]
    fn integers_and_floats_compare_numerically() {
        assert_eq!(compare(&json!(2), &json!(10.5)), Ordering::Less);
        assert_eq!(compare(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare(&json!("a"), &json!(1)), Ordering::Greater);
    }
}
