use std::fmt::Display;
use std::time::Duration;

use console::Style;

const ANSI_BLUE: Style = Style::new().blue();

/// Formats an elapsed duration as a short `(+Nms)` suffix for log lines.
pub(crate) fn as_overhead(elapsed: Duration) -> impl Display {
    let f = format!("(+{}ms)", elapsed.as_millis());
    ANSI_BLUE.apply_to(f)
}
