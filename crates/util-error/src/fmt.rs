use std::fmt;

/// Display an error together with its whole `source()` chain in one line
///
/// Meant for log fields: `err = %err.fmt_compact()`.
pub struct CompactDisplay<'e>(&'e (dyn std::error::Error + 'e));

impl fmt::Display for CompactDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, f)?;

        let mut source = self.0.source();
        while let Some(err) = source {
            f.write_str(": ")?;
            fmt::Display::fmt(err, f)?;
            source = err.source();
        }
        Ok(())
    }
}

pub trait FmtCompact {
    fn fmt_compact(&self) -> CompactDisplay<'_>;
}

impl<E> FmtCompact for E
where
    E: std::error::Error,
{
    fn fmt_compact(&self) -> CompactDisplay<'_> {
        CompactDisplay(self)
    }
}
