use std::num::ParseIntError;

fn parse_size_from_osstr(s: &str) -> Result<usize, ParseIntError> {
    let s = s.to_lowercase();
    let (number, unit) = s.split_at(s.find(|c: char| !c.is_digit(10)).unwrap_or(s.len()));
    let multiplier = match unit {
        "kb" => 1024,
        "mb" => 1024 * 1024,
        "gb" => 1024 * 1024 * 1024,
        _ => 1,
    };

    number
        .parse::<usize>()
        .map_err(|x| x.into())
        .map(|x| x * multiplier)
}

use structopt::StructOpt;

#[derive(Debug, StructOpt, Clone)]
#[structopt(name = "candor", about = "Tagged-heap runtime core for the dotlang language")]
pub struct Options {
    #[structopt(
        long = "page-size",
        help = "Size of a single semispace page",
        default_value = "512KB",
        parse(try_from_str = parse_size_from_osstr)
    )]
    pub page_size: usize,

    #[structopt(
        long = "initial-map-slots",
        help = "Slot count a freshly allocated object's property map starts with",
        default_value = "8"
    )]
    pub initial_map_slots: u32,

    #[structopt(long = "gc-verbose", help = "Enable verbose GC phase logging")]
    pub verbose_gc: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options { page_size: 512 * 1024, initial_map_slots: 8, verbose_gc: false }
    }
}
