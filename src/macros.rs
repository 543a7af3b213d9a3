/// Creates a template context from keys and values.
///
/// ```rust
/// # use djinn::context;
/// let ctx = context! {
///     name => "Peter",
///     location => "World",
/// };
/// ```
///
/// The value side accepts anything convertible into a
/// [`Value`](crate::value::Value); for arbitrary serializable host data
/// convert explicitly with
/// [`Value::from_serializable`](crate::value::Value::from_serializable):
///
/// ```rust
/// # use djinn::context;
/// # use djinn::value::Value;
/// # #[derive(serde::Serialize)] struct User { name: &'static str }
/// # let user = User { name: "Ada" };
/// let ctx = context! {
///     user => Value::from_serializable(&user),
///     visits => 42,
/// };
/// ```
#[macro_export]
macro_rules! context {
    () => {
        $crate::Context::new()
    };
    ( $($key:ident => $value:expr),* $(,)? ) => {{
        let mut ctx = $crate::Context::new();
        $(
            ctx.insert(stringify!($key), $value);
        )*
        ctx
    }};
}
