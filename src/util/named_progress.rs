use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{prefix} {bar:40.cyan/blue} {pos:>8}/{len:<8} [{elapsed_precise} ({eta} remaining)] {msg}";

pub trait NamedProgress {
    fn named_bar(name: &str, len: u64) -> Self;
}

impl NamedProgress for ProgressBar {
    fn named_bar(name: &str, len: u64) -> Self {
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or(ProgressStyle::default_bar());
        ProgressBar::new(len)
            .with_style(style)
            .with_prefix(name.to_string())
    }
}
