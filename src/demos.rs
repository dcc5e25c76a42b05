//! Built-in demo questions.
//!
//! Each demo pairs a reference type with a correct submission and at least one
//! buggy one, covering the main role combinations: plain solutions, arrays,
//! `@Next` lifecycles, grouped generators, printing solutions, standalone
//! verifiers and preconditions.

use std::sync::Arc;

use rand::Rng;

use diffgrade_core::{
    arg, check_match, ArrayValue, ArrayWrapper, Fault, FieldDef, MethodDef, Role, TypeDef,
    TypeDescriptor, Value,
};

/// Items a history buffer retains.
pub const HISTORY_CAPACITY: usize = 3;

/// A demo question with its submissions.
pub struct Demo {
    pub name: &'static str,
    pub summary: &'static str,
    reference: Arc<TypeDef>,
    submissions: Vec<(&'static str, Arc<TypeDef>)>,
}

impl Demo {
    pub fn reference(&self) -> &Arc<TypeDef> {
        &self.reference
    }

    pub fn submission(&self, name: &str) -> Option<&Arc<TypeDef>> {
        self.submissions
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, def)| def)
    }

    pub fn submission_names(&self) -> Vec<&'static str> {
        self.submissions.iter().map(|(n, _)| *n).collect()
    }
}

/// Every built-in demo, in listing order.
pub fn all() -> Vec<Demo> {
    vec![
        Demo {
            name: "add",
            summary: "static int addition with default edge and simple cases",
            reference: adder("Adder", i32::wrapping_add),
            submissions: vec![
                ("correct", adder("StudentAdder", i32::wrapping_add)),
                ("subtract", adder("StudentAdder", i32::wrapping_sub)),
            ],
        },
        Demo {
            name: "array-sum",
            summary: "sum of an int array, read through ArrayWrapper",
            reference: array_sum("ArraySum", false),
            submissions: vec![
                ("correct", array_sum("StudentArraySum", false)),
                ("off-by-one", array_sum("StudentArraySum", true)),
            ],
        },
        Demo {
            name: "history",
            summary: "bounded history buffer driven through @Next",
            reference: history("History", HISTORY_CAPACITY),
            submissions: vec![
                ("correct", history("StudentHistory", HISTORY_CAPACITY)),
                ("keeps-extra", history("StudentHistory", HISTORY_CAPACITY + 1)),
            ],
        },
        Demo {
            name: "range",
            summary: "inclusive range length with a grouped generator",
            reference: range("Range", 1),
            submissions: vec![
                ("correct", range("StudentRange", 1)),
                ("exclusive", range("StudentRange", 0)),
            ],
        },
        Demo {
            name: "greeting",
            summary: "printing solution compared on stdout",
            reference: greeter("Greeter", ","),
            submissions: vec![
                ("correct", greeter("StudentGreeter", ",")),
                ("missing-comma", greeter("StudentGreeter", "")),
            ],
        },
        Demo {
            name: "ledger",
            summary: "standalone verifier comparing receiver state",
            reference: ledger("Ledger", 1),
            submissions: vec![
                ("correct", ledger("StudentLedger", 1)),
                ("double-count", ledger("StudentLedger", 2)),
            ],
        },
        Demo {
            name: "divide",
            summary: "integer division guarded by a precondition",
            reference: divider("Divider", false),
            submissions: vec![
                ("correct", divider("StudentDivider", false)),
                ("euclidean", divider("StudentDivider", true)),
            ],
        },
    ]
}

/// The demo named `name`.
pub fn find(name: &str) -> Option<Demo> {
    all().into_iter().find(|d| d.name == name)
}

fn adder(name: &str, op: fn(i32, i32) -> i32) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("add")
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("add"))
                .body(move |_, args| {
                    let a = arg(args, 0)?.as_int()?;
                    let b = arg(args, 1)?.as_int()?;
                    Ok(Value::Int(op(a, b)))
                }),
        )
        .build()
}

fn array_sum(name: &str, skip_last: bool) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("sum")
                .param("values", TypeDescriptor::array_of(TypeDescriptor::Int))
                .returns(TypeDescriptor::Long)
                .role(Role::solution("sum"))
                .body(move |_, args| {
                    let values = ArrayWrapper::wrap(arg(args, 0)?.as_array()?.clone());
                    let end = if skip_last {
                        values.len().saturating_sub(1)
                    } else {
                        values.len()
                    };
                    let mut total = 0i64;
                    for i in 0..end {
                        total += i64::from(values.get(i)?.as_int()?);
                    }
                    Ok(Value::Long(total))
                }),
        )
        .build()
}

fn history(name: &str, capacity: usize) -> Arc<TypeDef> {
    let ints = TypeDescriptor::array_of(TypeDescriptor::Int);
    TypeDef::builder(name)
        .field(
            FieldDef::new("items", ints)
                .private()
                .initial(Value::Array(ArrayValue::new(&TypeDescriptor::Int, 0))),
        )
        .method(
            MethodDef::method("push")
                .param("value", TypeDescriptor::Int)
                .body(move |inv, args| {
                    let value = arg(args, 0)?.clone();
                    let current = ArrayWrapper::wrap(inv.field("items")?.as_array()?.clone());
                    let keep = current.len().min(capacity.saturating_sub(1));
                    let start = current.len() - keep;
                    let mut next = ArrayWrapper::new(&TypeDescriptor::Int, keep + 1);
                    for i in 0..keep {
                        next.set(i, current.get(start + i)?)?;
                    }
                    next.set(keep, value)?;
                    inv.set_field("items", next.into_value())?;
                    Ok(Value::Unit)
                }),
        )
        .method(
            MethodDef::method("total")
                .returns(TypeDescriptor::Long)
                .role(Role::solution("total"))
                .body(|inv, _| {
                    let items = ArrayWrapper::wrap(inv.field("items")?.as_array()?.clone());
                    let mut total = 0i64;
                    for i in 0..items.len() {
                        total += i64::from(items.get(i)?.as_int()?);
                    }
                    Ok(Value::Long(total))
                }),
        )
        .method(
            MethodDef::function("next")
                .param("current", TypeDescriptor::named(name))
                .param("iteration", TypeDescriptor::Int)
                .param("random", TypeDescriptor::RandomSource)
                .returns(TypeDescriptor::named(name))
                .role(Role::Next)
                .body(|inv, args| {
                    let Value::Object(current) = arg(args, 0)? else {
                        return Ok(Value::Object(inv.construct("History", &[])?));
                    };
                    let current = current.clone();
                    let value = inv.random()?.gen_range(-100..=100);
                    inv.call(&current, "push", &[Value::Int(value)])?;
                    Ok(Value::Object(current))
                }),
        )
        .build()
}

fn range(name: &str, inclusive: i32) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("length")
                .param("lo", TypeDescriptor::Int)
                .param("hi", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("length"))
                .body(move |_, args| {
                    let lo = arg(args, 0)?.as_int()?;
                    let hi = arg(args, 1)?.as_int()?;
                    Ok(Value::Int(hi - lo + inclusive))
                }),
        )
        .method(
            MethodDef::function("bounds")
                .param("complexity", TypeDescriptor::Int)
                .param("random", TypeDescriptor::RandomSource)
                .returns(TypeDescriptor::Tuple(vec![
                    TypeDescriptor::Int,
                    TypeDescriptor::Int,
                ]))
                .role(Role::grouped_generator("length"))
                .body(|inv, args| {
                    let c = arg(args, 0)?.as_int()?.clamp(0, 1 << 20);
                    let random = inv.random()?;
                    let lo = random.gen_range(-c..=c);
                    let hi = lo + random.gen_range(0..=c);
                    Ok(Value::Tuple(vec![Value::Int(lo), Value::Int(hi)]))
                }),
        )
        .build()
}

fn greeter(name: &str, separator: &'static str) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("greet")
                .param("name", TypeDescriptor::Str)
                .role(Role::printing_solution("greet"))
                .body(move |inv, args| {
                    let who = arg(args, 0)?.as_str()?.to_string();
                    inv.println(&format!("Hello{separator} {who}!"));
                    Ok(Value::Unit)
                }),
        )
        .build()
}

fn ledger(name: &str, factor: i64) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .field(FieldDef::new("balance", TypeDescriptor::Long))
        .method(
            MethodDef::method("deposit")
                .param("amount", TypeDescriptor::Int)
                .body(move |inv, args| {
                    let balance = inv.field("balance")?.as_long()?;
                    let amount = i64::from(arg(args, 0)?.as_int()?);
                    inv.set_field("balance", Value::Long(balance + amount * factor))?;
                    Ok(Value::Unit)
                }),
        )
        .method(
            MethodDef::function("next")
                .param("current", TypeDescriptor::named(name))
                .param("iteration", TypeDescriptor::Int)
                .param("random", TypeDescriptor::RandomSource)
                .returns(TypeDescriptor::named(name))
                .role(Role::Next)
                .body(|inv, args| {
                    let Value::Object(current) = arg(args, 0)? else {
                        return Ok(Value::Object(inv.construct("Ledger", &[])?));
                    };
                    let current = current.clone();
                    let amount = inv.random()?.gen_range(1..=500);
                    inv.call(&current, "deposit", &[Value::Int(amount)])?;
                    Ok(Value::Object(current))
                }),
        )
        .method(
            MethodDef::function("same_balance")
                .param("expected", TypeDescriptor::Outcome)
                .param("actual", TypeDescriptor::Outcome)
                .role(Role::standalone_verify("balance"))
                .verifier(|inv, expected, actual| {
                    let want = inv.get(expected.receiver()?, "balance")?;
                    let got = inv.get(actual.receiver()?, "balance")?;
                    check_match(&want, &got)
                }),
        )
        .build()
}

fn divider(name: &str, euclidean: bool) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("divide")
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("divide"))
                .body(move |_, args| {
                    let a = arg(args, 0)?.as_int()?;
                    let b = arg(args, 1)?.as_int()?;
                    let quotient = if euclidean {
                        a.checked_div_euclid(b)
                    } else {
                        a.checked_div(b)
                    };
                    quotient
                        .map(Value::Int)
                        .ok_or_else(|| Fault::thrown("ArithmeticException", "/ by zero"))
                }),
        )
        .method(
            MethodDef::function("nonzero_divisor")
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int)
                .returns(TypeDescriptor::Bool)
                .role(Role::precondition("divide"))
                .body(|_, args| Ok(Value::Bool(arg(args, 1)?.as_int()? != 0))),
        )
        .build()
}
