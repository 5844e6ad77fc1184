// ── Shared context trait ────────────────────────────────────────────────────

/// Error types that can be built from a plain message string.
///
/// Each crate implements this for its own `Error` and then invokes
/// [`impl_context!`] inside its error module. That yields a crate-local
/// `Context` trait with `.context()` / `.with_context()` on both `Result`
/// and `Option`, so call sites read the same as with `anyhow` while the
/// crate keeps a typed error enum.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait.
///
/// The invoking module must define `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`.
///
/// ```ignore
/// // in crates/foo/src/error.rs
/// mcpbox_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            /// Wrap the error (or `None`) with a fixed message.
            fn context(self, context: impl Into<String>) -> Result<T>;

            /// Wrap the error (or `None`) with a lazily built message.
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let ctx = context.into();
                self.map_err(|source| {
                    <Error as $crate::FromMessage>::from_message(format!("{ctx}: {source}"))
                })
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    let ctx = f().into();
                    <Error as $crate::FromMessage>::from_message(format!("{ctx}: {source}"))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug)]
    struct Error(String);

    impl crate::FromMessage for Error {
        fn from_message(message: String) -> Self {
            Self(message)
        }
    }

    type Result<T> = std::result::Result<T, Error>;

    crate::impl_context!();

    #[test]
    fn result_context_prefixes_source() {
        let res: std::result::Result<(), &str> = Err("boom");
        let err = res.context("starting backend").unwrap_err();
        assert_eq!(err.0, "starting backend: boom");
    }

    #[test]
    fn option_with_context_uses_closure() {
        let name = "alpha";
        let err = None::<u8>
            .with_context(|| format!("backend '{name}' has no port"))
            .unwrap_err();
        assert_eq!(err.0, "backend 'alpha' has no port");
    }

    #[test]
    fn ok_values_pass_through() {
        let value: Result<u8> = Some(7).context("unused");
        assert_eq!(value.unwrap(), 7);
    }
}
