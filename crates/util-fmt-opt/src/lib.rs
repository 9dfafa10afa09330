// SPDX-License-Identifier: MIT

use std::fmt;

/// `Display` for an `Option<T>`, printing `-` for `None`
pub struct FmtOption<'a, T>(Option<&'a T>);

impl<T> fmt::Display for FmtOption<'_, T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => v.fmt(f),
            None => f.write_str("-"),
        }
    }
}

pub trait AsFmtOption<T> {
    fn fmt_option(&self) -> FmtOption<'_, T>;
}

impl<T> AsFmtOption<T> for Option<T>
where
    T: fmt::Display,
{
    fn fmt_option(&self) -> FmtOption<'_, T> {
        FmtOption(self.as_ref())
    }
}

#[test]
fn fmt_option_sanity() {
    assert_eq!(Some(3).fmt_option().to_string(), "3");
    assert_eq!(None::<u32>.fmt_option().to_string(), "-");
}
