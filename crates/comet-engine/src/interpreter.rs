//! Evaluation of a linked module body.

use crate::ast::{BinaryOp, Expr, ImportBinding, StmtKind};
use crate::lexer::line_col;
use crate::module::ModuleUnit;
use crate::value::{JsError, Value};
use rustc_hash::FxHashMap;

/// Runs a module body. Assumes the unit is linked and its dependencies are
/// evaluated (or mid-evaluation, on a cycle). Returns the completion value:
/// the value of the last expression statement, or `undefined`.
pub(crate) fn run_body(unit: &ModuleUnit) -> Result<Value, Value> {
    let inner = &unit.inner;
    let mut env: FxHashMap<String, Value> = FxHashMap::default();

    // Connect import bindings. On a dependency cycle the partner module may
    // not have written a binding yet; reading it is the temporal dead zone.
    let deps = inner.resolved.borrow().clone();
    for (index, decl) in inner.body.imports().enumerate() {
        let dep = &deps[index];
        for binding in &decl.bindings {
            match binding {
                ImportBinding::Default { local } => {
                    let value = dep.export_value("default").ok_or_else(|| tdz(local))?;
                    env.insert(local.clone(), value);
                }
                ImportBinding::Named { imported, local } => {
                    let value = dep.export_value(imported).ok_or_else(|| tdz(imported))?;
                    env.insert(local.clone(), value);
                }
                ImportBinding::Namespace { local } => {
                    env.insert(local.clone(), dep.namespace());
                }
            }
        }
    }

    let mut completion = Value::Undefined;
    for stmt in &inner.body.statements {
        match &stmt.kind {
            StmtKind::Import(_) => {}
            StmtKind::Const { name, init } => {
                let value = eval(unit, &env, init)?;
                env.insert(name.clone(), value);
            }
            StmtKind::ExportConst { name, init } => {
                let value = eval(unit, &env, init)?;
                env.insert(name.clone(), value.clone());
                inner.exports.borrow_mut().insert(name.clone(), value);
            }
            StmtKind::ExportDefault(init) => {
                let value = eval(unit, &env, init)?;
                inner
                    .exports
                    .borrow_mut()
                    .insert("default".to_string(), value);
            }
            // Export lists are connected after the body has run
            StmtKind::ExportList(_) => {}
            StmtKind::Throw(expr) => {
                return Err(eval(unit, &env, expr)?);
            }
            StmtKind::Expr(expr) => {
                completion = eval(unit, &env, expr)?;
            }
        }
    }

    for stmt in &inner.body.statements {
        if let StmtKind::ExportList(entries) = &stmt.kind {
            let mut exports = inner.exports.borrow_mut();
            for entry in entries {
                let value = env.get(&entry.local).cloned().unwrap_or(Value::Undefined);
                exports.insert(entry.exported.clone(), value);
            }
        }
    }

    Ok(completion)
}

fn tdz(name: &str) -> Value {
    Value::reference_error(format!("Cannot access '{}' before initialization", name))
}

fn eval(unit: &ModuleUnit, env: &FxHashMap<String, Value>, expr: &Expr) -> Result<Value, Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Boolean(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Ident(name) => match name.as_str() {
            "undefined" => Ok(Value::Undefined),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => env
                .get(name)
                .cloned()
                .ok_or_else(|| Value::reference_error(format!("{} is not defined", name))),
        },
        Expr::Binary { op, lhs, rhs } => {
            let left = eval(unit, env, lhs)?;
            let right = eval(unit, env, rhs)?;
            Ok(apply_binary(*op, &left, &right))
        }
        Expr::Neg(operand) => {
            let value = eval(unit, env, operand)?;
            Ok(Value::Number(-value.to_number()))
        }
        Expr::Member { object, property } => {
            let value = eval(unit, env, object)?;
            member(&value, property)
        }
        Expr::NewError { message, span } => {
            let text = eval(unit, env, message)?.to_string();
            let (line, col) = line_col(&unit.inner.source, span.start);
            let stack = format!(
                "Error: {}\n    at {}:{}:{}",
                text,
                unit.url(),
                line,
                col
            );
            Ok(Value::Error(JsError::with_stack("Error", text, stack)))
        }
        Expr::DynamicImport(specifier) => {
            let specifier = eval(unit, env, specifier)?.to_string();
            let promise = unit.dynamic_import(&specifier)?;
            Ok(Value::Promise(promise))
        }
        Expr::ImportMeta => {
            let meta = unit.import_meta_object()?;
            Ok(Value::Object(meta))
        }
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::String(format!("{}{}", left, right))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
    }
}

fn member(value: &Value, property: &str) -> Result<Value, Value> {
    match value {
        Value::Undefined | Value::Null => Err(Value::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            value, property
        ))),
        Value::Object(obj) => Ok(obj.get(property).unwrap_or(Value::Undefined)),
        Value::Error(e) => Ok(match property {
            "name" => Value::String(e.name().to_string()),
            "message" => Value::String(e.message().to_string()),
            "stack" => e
                .stack()
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }),
        Value::String(s) => Ok(match property {
            "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }),
        _ => Ok(Value::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use crate::module::{Engine, ModuleOrigin, UnitStatus};
    use crate::value::Value;

    fn evaluate(source: &str) -> Result<Value, Value> {
        let ctx = Engine::new().create_context();
        let unit = ctx
            .compile_module(ModuleOrigin::new("file:///test.mjs"), source)
            .unwrap();
        unit.instantiate(&mut |_, _| unreachable!()).unwrap();
        unit.evaluate()
    }

    #[test]
    fn test_arithmetic_completion() {
        assert_eq!(evaluate("1 + 2 * 3;").unwrap(), Value::Number(7.0));
        assert_eq!(evaluate("(1 + 2) * 3;").unwrap(), Value::Number(9.0));
        assert_eq!(evaluate("-4 / 2;").unwrap(), Value::Number(-2.0));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            evaluate("'a' + 1;").unwrap(),
            Value::String("a1".to_string())
        );
    }

    #[test]
    fn test_const_bindings() {
        assert_eq!(
            evaluate("const x = 2;\nconst y = x * x;\ny;").unwrap(),
            Value::Number(4.0)
        );
    }

    #[test]
    fn test_undefined_reference_throws() {
        let err = evaluate("nope;").unwrap_err();
        let Value::Error(e) = err else {
            panic!("expected error value");
        };
        assert_eq!(e.name(), "ReferenceError");
        assert!(e.message().contains("nope is not defined"));
    }

    #[test]
    fn test_throw_string_value() {
        let err = evaluate("throw 'oops';").unwrap_err();
        assert_eq!(err, Value::String("oops".to_string()));
    }

    #[test]
    fn test_error_member_access() {
        assert_eq!(
            evaluate("const e = new Error('bad');\ne.message;").unwrap(),
            Value::String("bad".to_string())
        );
    }

    #[test]
    fn test_dynamic_import_without_hooks_throws() {
        let ctx = Engine::new().create_context();
        let unit = ctx
            .compile_module(ModuleOrigin::new("file:///dyn.mjs"), "import('dep');")
            .unwrap();
        unit.instantiate(&mut |_, _| unreachable!()).unwrap();
        let err = unit.evaluate().unwrap_err();
        let Value::Error(e) = err else {
            panic!("expected error value");
        };
        assert_eq!(e.name(), "TypeError");
        assert_eq!(unit.status(), UnitStatus::Errored);
    }
}
