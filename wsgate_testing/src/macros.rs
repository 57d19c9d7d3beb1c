//! Assertion macros shared by integration tests.

/// Await a receive future yielding an `Option` and panic with the call site
/// if it yields `None`.
#[macro_export]
macro_rules! recv_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("channel closed at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

/// Assert that a notification carries the given payload pattern.
#[macro_export]
macro_rules! assert_payload {
    ($notification:expr, $pattern:pat $(if $guard:expr)?) => {{
        let notification = $notification;
        match notification.message().map(::wsgate::Message::payload) {
            Some($pattern) $(if $guard)? => {}
            _ => panic!(
                "unexpected notification at {}:{}: {notification:?}",
                file!(),
                line!()
            ),
        }
    }};
}
