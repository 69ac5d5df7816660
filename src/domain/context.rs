//! Captured call arguments of a queued task.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TaskError;

/// Which JSON shape the caller's arguments serialized to.
///
/// Recorded at capture time so that an empty array or object is rebuilt as
/// itself rather than as "no arguments".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentShape {
    /// `null`: no arguments.
    Empty,
    /// A JSON array, stored in `args`.
    Positional,
    /// A JSON object, stored in `kwargs`.
    Keyword,
    /// A single scalar, stored as the only element of `args`.
    Single,
    /// Explicit positional and keyword arguments together.
    Mixed,
}

impl ArgumentShape {
    fn infer(args: &[Value], kwargs: &Map<String, Value>) -> Self {
        match (args.is_empty(), kwargs.is_empty()) {
            (true, true) => Self::Empty,
            (false, true) => Self::Positional,
            (true, false) => Self::Keyword,
            (false, false) => Self::Mixed,
        }
    }
}

/// Positional and keyword arguments captured when a task is queued.
///
/// A context is built exactly once, from the caller's arguments, and never
/// changes afterwards. Arguments are stored as JSON values so that a
/// backend can persist them and a worker can rebuild the executable's
/// argument type from them.
///
/// [`capture`](Self::capture) maps the serialized argument value as follows:
///
/// | Serialized value | `args`        | `kwargs`       | shape        |
/// |------------------|---------------|----------------|--------------|
/// | array            | the elements  | empty          | `Positional` |
/// | object           | empty         | the entries    | `Keyword`    |
/// | `null`           | empty         | empty          | `Empty`      |
/// | anything else    | `[value]`     | empty          | `Single`     |
///
/// The shape makes the capture lossless with respect to the JSON value:
/// `Some(vec![])` comes back as `Some(vec![])`, not `None`. Values that
/// JSON itself cannot tell apart stay indistinguishable; `Some(())`
/// serializes to `null` and is rebuilt as `None`.
///
/// # Examples
///
/// ```
/// use quesadilla::TaskExecutionContext;
/// use serde_json::json;
///
/// let ctx = TaskExecutionContext::capture(&(2, 3)).unwrap();
/// assert_eq!(ctx.args(), &[json!(2), json!(3)]);
/// assert!(ctx.kwargs().is_empty());
///
/// let (a, b): (i32, i32) = ctx.extract().unwrap();
/// assert_eq!(a + b, 5);
///
/// let empty = TaskExecutionContext::capture(&Some(Vec::<i32>::new())).unwrap();
/// assert_eq!(empty.extract::<Option<Vec<i32>>>().unwrap(), Some(vec![]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionContext {
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    kwargs: Map<String, Value>,
    /// Absent in records written without it; inferred from the parts then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape: Option<ArgumentShape>,
}

impl TaskExecutionContext {
    /// Creates a context from explicit positional and keyword arguments.
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        let shape = ArgumentShape::infer(&args, &kwargs);
        Self {
            args,
            kwargs,
            shape: Some(shape),
        }
    }

    /// Captures a context from any serializable argument value.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Serialization`] if `arguments` cannot be
    /// serialized to JSON.
    pub fn capture<A: Serialize + ?Sized>(arguments: &A) -> Result<Self, TaskError> {
        let value = serde_json::to_value(arguments)?;
        let (args, kwargs, shape) = match value {
            Value::Null => (Vec::new(), Map::new(), ArgumentShape::Empty),
            Value::Array(args) => (args, Map::new(), ArgumentShape::Positional),
            Value::Object(kwargs) => (Vec::new(), kwargs, ArgumentShape::Keyword),
            scalar => (vec![scalar], Map::new(), ArgumentShape::Single),
        };
        Ok(Self {
            args,
            kwargs,
            shape: Some(shape),
        })
    }

    /// Positional arguments, in call order.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Keyword arguments.
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    /// The JSON shape the arguments were captured from.
    pub fn shape(&self) -> ArgumentShape {
        self.shape
            .unwrap_or_else(|| ArgumentShape::infer(&self.args, &self.kwargs))
    }

    /// Returns `true` if the captured value was `null` (unit, `None`).
    pub fn is_empty(&self) -> bool {
        self.shape() == ArgumentShape::Empty
    }

    /// Rebuilds the JSON value the context was captured from.
    ///
    /// A context holding both positional and keyword arguments renders as
    /// `{"args": [...], "kwargs": {...}}`.
    pub fn to_value(&self) -> Value {
        match self.shape() {
            ArgumentShape::Empty => Value::Null,
            ArgumentShape::Positional => Value::Array(self.args.clone()),
            ArgumentShape::Keyword => Value::Object(self.kwargs.clone()),
            ArgumentShape::Single => self.args.first().cloned().unwrap_or(Value::Null),
            ArgumentShape::Mixed => serde_json::json!({
                "args": self.args,
                "kwargs": self.kwargs,
            }),
        }
    }

    /// Deserializes the arguments into the executable's argument type.
    ///
    /// The value returned by [`to_value`](Self::to_value) is tried first.
    /// Contexts built by hand with [`new`](Self::new) have no captured
    /// value to go back to, so a few alternatives are tried after it: a
    /// single positional argument on its own, and an empty context as
    /// `[]` and `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Serialization`] with the error of the primary
    /// attempt if no candidate deserializes into `A`.
    pub fn extract<A: DeserializeOwned>(&self) -> Result<A, TaskError> {
        let primary = match serde_json::from_value::<A>(self.to_value()) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let fallbacks: Vec<Value> = match (self.args.as_slice(), self.kwargs.is_empty()) {
            ([single], true) => vec![single.clone()],
            ([], true) => vec![Value::Array(Vec::new()), Value::Object(Map::new())],
            _ => Vec::new(),
        };

        fallbacks
            .into_iter()
            .find_map(|candidate| serde_json::from_value::<A>(candidate).ok())
            .ok_or_else(|| TaskError::Serialization(primary.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Resize {
        width: u32,
        height: u32,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Empty {}

    #[test]
    fn tuple_captures_positional_args() {
        let ctx = TaskExecutionContext::capture(&(1, "two", true)).unwrap();
        assert_eq!(ctx.args(), &[json!(1), json!("two"), json!(true)]);
        assert!(ctx.kwargs().is_empty());
        let back: (i32, String, bool) = ctx.extract().unwrap();
        assert_eq!(back, (1, "two".to_string(), true));
    }

    #[test]
    fn struct_captures_keyword_args() {
        let ctx = TaskExecutionContext::capture(&Resize {
            width: 640,
            height: 480,
        })
        .unwrap();
        assert!(ctx.args().is_empty());
        assert_eq!(ctx.kwargs()["width"], json!(640));
        let back: Resize = ctx.extract().unwrap();
        assert_eq!(back.height, 480);
    }

    #[test]
    fn scalar_is_single_positional_arg() {
        let ctx = TaskExecutionContext::capture(&42_u64).unwrap();
        assert_eq!(ctx.args(), &[json!(42)]);
        let back: u64 = ctx.extract().unwrap();
        assert_eq!(back, 42);
    }

    #[test]
    fn unit_captures_nothing() {
        let ctx = TaskExecutionContext::capture(&()).unwrap();
        assert!(ctx.is_empty());
        ctx.extract::<()>().unwrap();
    }

    #[test]
    fn empty_collections_survive_extraction() {
        let ctx = TaskExecutionContext::capture(&Vec::<i32>::new()).unwrap();
        assert!(!ctx.is_empty());
        assert_eq!(ctx.shape(), ArgumentShape::Positional);
        assert_eq!(ctx.extract::<Vec<i32>>().unwrap(), Vec::<i32>::new());

        let ctx = TaskExecutionContext::capture(&Empty {}).unwrap();
        assert_eq!(ctx.shape(), ArgumentShape::Keyword);
        assert_eq!(ctx.extract::<Empty>().unwrap(), Empty {});
    }

    #[test]
    fn hand_built_empty_context_extracts_empty_values() {
        let ctx = TaskExecutionContext::new(Vec::new(), Map::new());
        assert!(ctx.is_empty());
        assert_eq!(ctx.extract::<Vec<i32>>().unwrap(), Vec::<i32>::new());
        assert_eq!(ctx.extract::<Empty>().unwrap(), Empty {});
    }

    // ---- Option and empty containers ----

    #[test]
    fn some_empty_vec_is_not_none() {
        let ctx = TaskExecutionContext::capture(&Some(Vec::<i32>::new())).unwrap();
        assert_eq!(ctx.extract::<Option<Vec<i32>>>().unwrap(), Some(vec![]));

        let ctx = TaskExecutionContext::capture(&None::<Vec<i32>>).unwrap();
        assert_eq!(ctx.extract::<Option<Vec<i32>>>().unwrap(), None);
    }

    #[test]
    fn some_empty_map_is_not_none() {
        let ctx = TaskExecutionContext::capture(&Some(HashMap::<String, i32>::new())).unwrap();
        assert_eq!(
            ctx.extract::<Option<HashMap<String, i32>>>().unwrap(),
            Some(HashMap::new())
        );
    }

    #[test]
    fn nested_empty_containers_keep_their_structure() {
        let value: Vec<Vec<i32>> = vec![vec![], vec![1], vec![]];
        let ctx = TaskExecutionContext::capture(&value).unwrap();
        assert_eq!(ctx.extract::<Vec<Vec<i32>>>().unwrap(), value);

        let value = (Some(()), Vec::<u8>::new());
        let ctx = TaskExecutionContext::capture(&value).unwrap();
        assert_eq!(ctx.extract::<(Option<()>, Vec<u8>)>().unwrap(), (None, vec![]));
    }

    #[test]
    fn some_unit_is_null_in_json() {
        // JSON has a single `null` for both `None` and `Some(())`.
        assert_eq!(serde_json::to_value(Some(())).unwrap(), Value::Null);
        let ctx = TaskExecutionContext::capture(&Some(())).unwrap();
        assert!(ctx.is_empty());
        assert_eq!(ctx.extract::<Option<()>>().unwrap(), None);
    }

    #[test]
    fn single_scalar_rebuilds_directly() {
        let ctx = TaskExecutionContext::capture(&Some(7_i32)).unwrap();
        assert_eq!(ctx.shape(), ArgumentShape::Single);
        assert_eq!(ctx.to_value(), json!(7));
        assert_eq!(ctx.extract::<Option<i32>>().unwrap(), Some(7));
    }

    #[test]
    fn shape_survives_serialization() {
        let ctx = TaskExecutionContext::capture(&Some(Vec::<i32>::new())).unwrap();
        let json = serde_json::to_string(&ctx).unwrap();
        let back: TaskExecutionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
        assert_eq!(back.extract::<Option<Vec<i32>>>().unwrap(), Some(vec![]));
    }

    #[test]
    fn records_without_shape_infer_it() {
        let ctx: TaskExecutionContext =
            serde_json::from_value(json!({"args": [1, 2], "kwargs": {}})).unwrap();
        assert_eq!(ctx.shape(), ArgumentShape::Positional);
        assert_eq!(ctx.extract::<(i32, i32)>().unwrap(), (1, 2));
    }

    #[test]
    fn mixed_context_renders_both_parts() {
        let mut kwargs = Map::new();
        kwargs.insert("scale".to_string(), json!(2));
        let ctx = TaskExecutionContext::new(vec![json!("img.png")], kwargs);
        assert_eq!(
            ctx.to_value(),
            json!({"args": ["img.png"], "kwargs": {"scale": 2}})
        );
    }

    #[test]
    fn mismatched_type_is_serialization_error() {
        let ctx = TaskExecutionContext::capture(&("a", "b")).unwrap();
        let err = ctx.extract::<(i32, i32)>().unwrap_err();
        assert!(matches!(err, TaskError::Serialization(_)));
    }
}
