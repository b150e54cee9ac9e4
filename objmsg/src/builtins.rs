//! Built-in functions for handler bodies: arithmetic, comparison and a
//! little multifield support.

use crate::engine::Engine;
use crate::error::DispatchError;
use crate::value::Value;

pub(crate) fn install(engine: &mut Engine) {
    engine.define_function("+", |engine, args| arithmetic(engine, "+", args, i64::wrapping_add, |a, b| a + b));
    engine.define_function("-", |engine, args| arithmetic(engine, "-", args, i64::wrapping_sub, |a, b| a - b));
    engine.define_function("*", |engine, args| arithmetic(engine, "*", args, i64::wrapping_mul, |a, b| a * b));
    engine.define_function("/", divide);
    engine.define_function("=", |engine, args| compare(engine, "=", args, |a, b| a == b));
    engine.define_function("<", |engine, args| compare(engine, "<", args, |a, b| a < b));
    engine.define_function(">", |engine, args| compare(engine, ">", args, |a, b| a > b));
    engine.define_function("eq", |_, args| Value::Boolean(args.windows(2).all(|pair| pair[0] == pair[1])));
    engine.define_function("neq", |_, args| {
        Value::Boolean(args.split_first().is_some_and(|(first, rest)| rest.iter().all(|v| v != first)))
    });
    engine.define_function("create$", |_, args| {
        Value::multifield(args.iter().cloned().flat_map(Value::spread))
    });
    engine.define_function("length$", length);
}

fn type_error(engine: &mut Engine, function: &str, expected: &'static str) -> Value {
    engine.report(DispatchError::TypeError {
        function: function.to_string(),
        expected,
    });
    Value::FALSE
}

/// Integer arithmetic while every argument is an integer, float otherwise.
fn arithmetic(
    engine: &mut Engine,
    function: &str,
    args: &[Value],
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    let Some((first, rest)) = args.split_first() else {
        return type_error(engine, function, "at least one argument");
    };
    let mut acc = first.clone();
    for arg in rest {
        acc = match (&acc, arg) {
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(int_op(*a, *b)),
            _ => match (acc.as_float(), arg.as_float()) {
                (Some(a), Some(b)) => Value::Float(float_op(a, b)),
                _ => return type_error(engine, function, "numeric arguments"),
            },
        };
    }
    if acc.as_float().is_none() {
        return type_error(engine, function, "numeric arguments");
    }
    acc
}

fn divide(engine: &mut Engine, args: &[Value]) -> Value {
    let numbers: Option<Vec<f64>> = args.iter().map(Value::as_float).collect();
    let Some((first, rest)) = numbers.as_deref().and_then(<[f64]>::split_first) else {
        return type_error(engine, "/", "numeric arguments");
    };
    if rest.contains(&0.0) {
        return type_error(engine, "/", "a non-zero divisor");
    }
    Value::Float(rest.iter().fold(*first, |acc, x| acc / x))
}

fn compare(engine: &mut Engine, function: &str, args: &[Value], op: fn(f64, f64) -> bool) -> Value {
    let numbers: Option<Vec<f64>> = args.iter().map(Value::as_float).collect();
    match numbers {
        Some(numbers) if !numbers.is_empty() => Value::Boolean(numbers.windows(2).all(|pair| op(pair[0], pair[1]))),
        _ => type_error(engine, function, "numeric arguments"),
    }
}

fn length(engine: &mut Engine, args: &[Value]) -> Value {
    match args {
        [Value::Multifield(items)] => Value::Integer(items.len() as i64),
        [Value::String(text)] => Value::Integer(text.chars().count() as i64),
        _ => type_error(engine, "length$", "one multifield or string"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;

    fn call(engine: &mut Engine, name: &str, args: Vec<Value>) -> Value {
        let function = engine.intern(name);
        engine.eval(&Action::call(function, args.into_iter().map(Action::Const).collect()))
    }

    #[test]
    fn test_arithmetic_promotes_to_float() {
        let mut engine = Engine::new();
        assert_eq!(call(&mut engine, "*", vec![Value::Integer(5), Value::Integer(5)]), Value::Integer(25));
        assert_eq!(call(&mut engine, "+", vec![Value::Integer(1), Value::Float(0.5)]), Value::Float(1.5));
        assert_eq!(call(&mut engine, "/", vec![Value::Integer(9), Value::Integer(2)]), Value::Float(4.5));
    }

    #[test]
    fn test_type_errors_are_reported() {
        let mut engine = Engine::new();
        assert_eq!(call(&mut engine, "+", vec![Value::Integer(1), Value::string("x")]), Value::FALSE);
        assert!(engine.evaluation_error());
        assert_eq!(call(&mut engine, "/", vec![Value::Integer(1), Value::Integer(0)]), Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::TypeError { expected: "a non-zero divisor", .. })
        ));
    }

    #[test]
    fn test_multifield_functions() {
        let mut engine = Engine::new();
        let list = call(
            &mut engine,
            "create$",
            vec![Value::Integer(1), Value::multifield([Value::Integer(2), Value::Integer(3)])],
        );
        assert_eq!(list, Value::multifield([Value::Integer(1), Value::Integer(2), Value::Integer(3)]));
        assert_eq!(call(&mut engine, "length$", vec![list]), Value::Integer(3));
        assert_eq!(call(&mut engine, "<", vec![Value::Integer(1), Value::Float(2.5)]), Value::TRUE);
        assert_eq!(call(&mut engine, "eq", vec![Value::Integer(1), Value::Integer(1)]), Value::TRUE);
    }
}
