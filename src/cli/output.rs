use ansi_term::{Colour, Style};

use crate::stats::{AggregatedStats, StatsBuckets};
use crate::store::entities::UserEntity;

fn presence_tag(is_online: bool) -> ansi_term::ANSIString<'static> {
    if is_online {
        Colour::Green.paint("online")
    } else {
        Colour::Red.paint("offline")
    }
}

fn print_bucket_row(label: &str, scores: f64, hours: f64) {
    println!("{label}\t{scores}\t{hours}");
}

pub fn print_stats(stats: &AggregatedStats) {
    println!(
        "{} ({})",
        Style::new().bold().paint(&*stats.username),
        presence_tag(stats.is_online)
    );
    println!("daily score: {}", stats.daily_score);
    println!();

    let StatsBuckets {
        today,
        week,
        month,
        year,
    } = stats.scores;
    let hours = &stats.hours;
    println!("\t{}\t{}", Style::new().underline().paint("score"), Style::new().underline().paint("hours"));
    print_bucket_row("today", today, hours.today);
    print_bucket_row("week", week, hours.week);
    print_bucket_row("month", month, hours.month);
    print_bucket_row("year", year, hours.year);
}

pub fn print_today(username: &str, score: f64) {
    println!("{}\t{score}", Style::new().bold().paint(username));
}

pub fn print_online(users: &[UserEntity]) {
    if users.is_empty() {
        println!("Nobody is online");
        return;
    }
    for user in users {
        println!("{} ({})", user.username, presence_tag(true));
    }
}
