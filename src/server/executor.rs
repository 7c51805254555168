//! Typed method executors.
//!
//! The server holds a uniform `name -> executor` map where each executor is
//! a trait object (`SPEC_FULL.md` §4.9, §9: "per-method type-specialization
//! happens at registration time"). `handler0`..`handler4` below are the
//! generic constructors: each instantiates an `Executor` that knows how to
//! unpack an N-element `params` array into the wrapped function's argument
//! tuple, generated once per arity by macro rather than duplicated by hand.

use std::future::Future;
use std::pin::Pin;

use rmpv::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A boxed, type-erased future, since `Executor` trait objects can't carry
/// an associated `Future` type.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The result of invoking a method: either the encoded success result or
/// the encoded error payload, both already `rmpv::Value`s ready to drop
/// straight into a response message (`SPEC_FULL.md` §3).
pub enum Outcome {
    Ok(Value),
    Err(Value),
}

/// One entry in the server's `method_name -> executor` map.
pub trait Executor: Send + Sync {
    fn invoke(&self, params: Vec<Value>) -> BoxFuture<Outcome>;
}

fn arity_mismatch(expected: usize, got: usize) -> Outcome {
    Outcome::Err(Value::from(format!(
        "expected {expected} parameter(s), got {got}"
    )))
}

fn decode_param<T: DeserializeOwned>(value: Value, index: usize) -> Result<T, Outcome> {
    rmpv::ext::from_value(value).map_err(|e| {
        Outcome::Err(Value::from(format!(
            "parameter {index} has the wrong type: {e}"
        )))
    })
}

fn encode_result<R: Serialize>(result: R) -> Outcome {
    match rmpv::ext::to_value(&result) {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::Err(Value::from(format!("failed to encode result: {e}"))),
    }
}

macro_rules! impl_executor_arity {
    ($ctor:ident, $struct_name:ident, $count:expr; $($idx:tt : $p:ident : $pt:ident),*) => {
        struct $struct_name<F> {
            f: F,
        }

        impl<F, Fut, R, E, $($pt),*> Executor for $struct_name<F>
        where
            F: Fn($($pt),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
            R: Serialize + Send + 'static,
            E: std::fmt::Display + Send + 'static,
            $($pt: DeserializeOwned + Send + 'static,)*
        {
            fn invoke(&self, params: Vec<Value>) -> BoxFuture<Outcome> {
                if params.len() != $count {
                    let got = params.len();
                    return Box::pin(async move { arity_mismatch($count, got) });
                }
                #[allow(unused_mut, unused_variables)]
                let mut params = params.into_iter();
                $(
                    let $p: $pt = match decode_param(params.next().unwrap(), $idx) {
                        Ok(v) => v,
                        Err(outcome) => return Box::pin(async move { outcome }),
                    };
                )*
                let fut = (self.f)($($p),*);
                Box::pin(async move {
                    match fut.await {
                        Ok(r) => encode_result(r),
                        Err(e) => Outcome::Err(Value::from(e.to_string())),
                    }
                })
            }
        }

        #[doc = concat!(
            "Build an executor for a ", stringify!($count),
            "-argument method. `f` is invoked with the method's positional ",
            "parameters decoded via `serde`; its `Result`'s `Ok` is encoded ",
            "as the response result, its `Err` (anything `Display`) becomes ",
            "the response's error payload."
        )]
        pub fn $ctor<F, Fut, R, E, $($pt),*>(f: F) -> Box<dyn Executor>
        where
            F: Fn($($pt),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
            R: Serialize + Send + 'static,
            E: std::fmt::Display + Send + 'static,
            $($pt: DeserializeOwned + Send + 'static,)*
        {
            Box::new($struct_name { f })
        }
    };
}

impl_executor_arity!(handler0, Executor0, 0;);
impl_executor_arity!(handler1, Executor1, 1; 0: p0: P0);
impl_executor_arity!(handler2, Executor2, 2; 0: p0: P0, 1: p1: P1);
impl_executor_arity!(handler3, Executor3, 3; 0: p0: P0, 1: p1: P1, 2: p2: P2);
impl_executor_arity!(handler4, Executor4, 4; 0: p0: P0, 1: p1: P1, 2: p2: P2, 3: p3: P3);

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_ok(outcome: Outcome) -> Value {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("expected Ok, got error: {e:?}"),
        }
    }

    fn expect_err(outcome: Outcome) -> Value {
        match outcome {
            Outcome::Err(e) => e,
            Outcome::Ok(v) => panic!("expected Err, got ok: {v:?}"),
        }
    }

    #[tokio::test]
    async fn zero_arity_handler_runs() {
        let exec = handler0(|| async { Ok::<_, String>(()) });
        let outcome = exec.invoke(vec![]).await;
        assert_eq!(expect_ok(outcome), Value::Nil);
    }

    #[tokio::test]
    async fn one_arity_handler_decodes_and_encodes() {
        let exec = handler1(|s: String| async move { Ok::<_, String>(s) });
        let outcome = exec.invoke(vec![Value::from("abc")]).await;
        assert_eq!(expect_ok(outcome), Value::from("abc"));
    }

    #[tokio::test]
    async fn wrong_arity_is_an_error_outcome() {
        let exec = handler1(|s: String| async move { Ok::<_, String>(s) });
        let outcome = exec.invoke(vec![]).await;
        let err = expect_err(outcome);
        assert!(err.as_str().unwrap().contains("expected 1"));
    }

    #[tokio::test]
    async fn wrong_param_type_is_an_error_outcome() {
        let exec = handler1(|_: String| async move { Ok::<_, String>(String::new()) });
        let outcome = exec.invoke(vec![Value::from(1u64)]).await;
        assert!(matches!(expect_err(outcome), Value::String(_)));
    }

    #[tokio::test]
    async fn user_error_becomes_error_outcome() {
        let exec = handler0(|| async { Err::<(), _>("boom") });
        let outcome = exec.invoke(vec![]).await;
        assert_eq!(expect_err(outcome), Value::from("boom"));
    }
}
