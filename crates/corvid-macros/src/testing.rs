// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Testing helper macros.

/// Assert that an expression matches a pattern, with an optional guard.
///
/// # Example
///
/// ```
/// use corvid_macros::assert_matches;
///
/// let slot: Result<u32, &str> = Ok(7);
/// assert_matches!(slot, Ok(n) if n > 3);
/// ```
#[macro_export]
macro_rules! assert_matches {
    ($expr:expr, $pat:pat $(if $guard:expr)? $(,)?) => {
        match $expr {
            $pat $(if $guard)? => {}
            ref other => panic!(
                "assertion failed: `{}` does not match `{}`\n  value: {:?}",
                stringify!($expr),
                stringify!($pat $(if $guard)?),
                other
            ),
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_matches_accepts() {
        assert_matches!(Some(3), Some(_));
        assert_matches!(Some(3), Some(n) if n == 3);
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_assert_matches_rejects() {
        assert_matches!(None::<u8>, Some(_));
    }
}
