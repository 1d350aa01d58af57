#![allow(unused_macros)]

macro_rules! cfg_ldap {
    ($($item:item)*) => {
        $(
            #[cfg_attr(docsrs, doc(cfg(feature = "ldap")))]
            #[cfg(feature = "ldap")]
            $item
        )*
    }
}

/// Emits the same event through `tracing` and `log`, whichever is enabled
macro_rules! trace_event {
    ($level:ident, $($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::$level!($($arg)+);
        #[cfg(feature = "log")]
        log::$level!($($arg)+);
    };
}
