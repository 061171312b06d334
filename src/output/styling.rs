use std::fmt::Display;

use console::{style, StyledObject};

type Styled = StyledObject<String>;

fn styled(text: impl Display) -> Styled {
    style(text.to_string())
}

pub fn title(text: impl Display) -> Styled {
    styled(text).magenta().bold()
}

/// Section heading of the summary.
pub fn heading(text: impl Display) -> Styled {
    styled(text).bright().underlined()
}

pub fn emphasis(text: impl Display) -> Styled {
    styled(text).bright()
}

/// Field names and secondary details.
pub fn label(text: impl Display) -> Styled {
    styled(text).dim()
}

pub fn value(text: impl Display) -> Styled {
    styled(text).cyan()
}

pub fn warning(text: impl Display) -> Styled {
    styled(text).bright().yellow()
}

pub fn in_progress(text: impl Display) -> Styled {
    styled(text).bright().yellow()
}

pub fn done(text: impl Display) -> Styled {
    styled(text).bright().green()
}

/// Green when nothing failed, red otherwise.
pub fn failure_count(count: usize) -> Styled {
    if count == 0 {
        done(count)
    } else {
        styled(count).bright().red()
    }
}
