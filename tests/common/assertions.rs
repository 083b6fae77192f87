//! Assertions over `FormResult`s, error text, and state that background
//! tasks (autosave, the reconnect listener) update asynchronously.

/// Unwrap a `FormResult`, printing the `FormError` on failure
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert a `FormError`, optionally of a given variant pattern
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        assert!($result.is_err(), "Expected Err, got Ok");
    };
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => panic!("Expected different error variant, got: {:?}", e),
        }
    };
}

/// Assert that an error message or log line contains `needle`
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {{
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected '{}' to contain '{}'",
            haystack,
            needle
        );
    }};
}

/// Poll `$cond` until it holds, yielding to other tasks in between
#[macro_export]
macro_rules! wait_until {
    ($cond:expr) => {
        $crate::wait_until!($cond, std::time::Duration::from_secs(2))
    };
    ($cond:expr, $timeout:expr) => {{
        let deadline = tokio::time::Instant::now() + $timeout;
        while !$cond {
            if tokio::time::Instant::now() >= deadline {
                panic!("condition not met in time: {}", stringify!($cond));
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }};
}
