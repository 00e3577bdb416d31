use indicatif::{ProgressBar, ProgressStyle};

pub fn create_progress_bar(total_accounts: usize) -> ProgressBar {
    let pb = ProgressBar::new(total_accounts as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} accounts ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
