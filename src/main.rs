mod curves;
mod pts;
mod solver;
mod types;

use std::error::Error;
#[macro_use]
extern crate lazy_static;

use chrono::NaiveDate;
use clap::{App, Arg, ArgMatches};
use regex::Regex;
use simple_error::{bail, SimpleError};
use std::fs;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use pts::Pts;
use solver::Solver;
use types::{load_from_file, MovementNetDict, SerdeFormat};

// This is handy, because several of our dependencies define their own
// Result types and we don't want to repeat std::result::Result
type FnResult<R> = std::result::Result<R, Box<dyn Error>>;

pub struct Main {
    verbose: bool,
    args: ArgMatches,
    curves_path: String,
    //file cache using a Mutex so main doesn't have to be mutable:
    net_cache: Mutex<FileCache<MovementNetDict>>,
}

fn main() -> FnResult<()> {
    let mut instance = Main::new()?;
    instance.run()?;
    Ok(())
}

trait OrError<T> {
    fn or_error(self, message: &str) -> FnResult<T>;
}

impl<T> OrError<T> for Option<T> {
    fn or_error(self, message: &str) -> FnResult<T> {
        if self.is_none() {
            bail!(message);
        }
        Ok(self.unwrap())
    }
}

impl<T, E> OrError<T> for std::result::Result<T, E>
where
    E: Debug,
{
    fn or_error(self, message: &str) -> FnResult<T> {
        match self {
            Err(e) => bail!(format!("{}\nInner error message: {:?}", message, e)),
            Ok(t) => Ok(t),
        }
    }
}

/// Parses a date like "2020-06-15" out of an artifact date-list entry.
pub fn date_from_string(date_string: &str) -> FnResult<NaiveDate> {
    lazy_static! {
        static ref FIND_DATE: Regex = Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap(); // can't fail because our hard-coded regex is known to be ok
    }
    let date_element_captures = FIND_DATE.captures(date_string).or_error(&format!(
        "Date entry does not contain a valid date (does not match format YYYY-MM-DD): {}",
        date_string
    ))?;
    let date_option = NaiveDate::from_ymd_opt(
        date_element_captures[1].parse().unwrap(), // can't fail because input string is known to be a bunch of decimal digits
        date_element_captures[2].parse().unwrap(), // can't fail because input string is known to be a bunch of decimal digits
        date_element_captures[3].parse().unwrap(), // can't fail because input string is known to be a bunch of decimal digits
    );
    Ok(date_option.ok_or(SimpleError::new(format!(
        "Date entry looks ok, but values are out of bounds: {}",
        date_string
    )))?)
}

fn parse_args() -> ArgMatches {
    let app = App::new("corridor-curves")
        .subcommand(Solver::get_subcommand())
        .subcommand(Pts::get_subcommand())
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Output status messages during run.")
        ).arg(Arg::new("curves")
            .short('c')
            .long("curves")
            .env("CURVES_FILE")
            .takes_value(true)
            .required_unless_present("help")
            .help("The calibrated-curve artifact (.json or .mpack) that holds every movement's curves.")
        );

    app.get_matches()
}

impl Main {
    /// Constructs a new instance of Main with parsed arguments.
    fn new() -> FnResult<Main> {
        let args = parse_args();
        let verbose = args.is_present("verbose");
        let curves_path = String::from(args.value_of("curves").unwrap()); // already validated by clap
        Ok(Main {
            args,
            verbose,
            curves_path,
            net_cache: Mutex::new(FileCache::<MovementNetDict>::new()),
        })
    }

    /// Runs the actions that are selected via the command line args
    fn run(&mut self) -> FnResult<()> {
        match self.args.clone().subcommand() {
            Some(("predict", sub_args)) => {
                let mut solver = Solver::new(&self, sub_args);
                solver.run()
            }
            Some(("pts", sub_args)) => {
                let mut pts = Pts::new(&self, sub_args);
                pts.run()
            }
            _ => panic!("Invalid arguments."),
        }
    }

    /// Returns the movement net (cached between subcommand invocations).
    pub fn get_net(&self) -> FnResult<Arc<MovementNetDict>> {
        let net = FileCache::get_cached_simple(&self.net_cache, &self.curves_path)?;
        if self.verbose {
            let date_range = Self::date_range(&net);
            println!(
                "Loaded {} movements at resolution {}s over {} dates{}.",
                net.dict.len(),
                net.resolution,
                net.date_list.len(),
                match date_range {
                    Some((first, last)) => format!(" ({} to {})", first, last),
                    None => String::new(),
                }
            );
        }
        Ok(net)
    }

    fn date_range(net: &MovementNetDict) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates: Vec<NaiveDate> = net
            .date_list
            .iter()
            .filter_map(|date_string| date_from_string(date_string).ok())
            .collect();
        dates.sort();
        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => Some((*first, *last)),
            _ => None,
        }
    }
}

pub struct FileCache<T> {
    object: Option<Arc<T>>,
    filename: Option<String>,
    modification_time: Option<std::time::SystemTime>,
}

impl<T> FileCache<T>
where
    T: Loadable<T>,
{
    //creates a new, empty file cache
    pub fn new() -> FileCache<T> {
        FileCache::<T> {
            object: None,
            filename: None,
            modification_time: None,
        }
    }

    // wrapper around get_cached so the mutex stuff does not have to be repeated
    pub fn get_cached_simple(cache: &Mutex<Self>, filename: &str) -> FnResult<Arc<T>> {
        let mut cache_lock = cache.lock().unwrap();
        cache_lock.get_cached(filename)
    }

    // Returns the cached object.
    // If possible, use get_cached_simple instead to avoid dealing with mutex stuff directly.
    pub fn get_cached(&mut self, filename: &str) -> FnResult<Arc<T>> {
        let metadata = fs::metadata(filename)?;
        let mod_time = metadata.modified()?;

        let filename_changed = self.filename.as_deref() != Some(filename);
        let modtime_changed = self.modification_time != Some(mod_time);
        if filename_changed {
            self.filename = Some(filename.to_string());
        }
        if filename_changed || modtime_changed {
            self.modification_time = Some(mod_time);
            self.object = None;
            let obj = <T>::load(filename)?;
            self.object = Some(Arc::new(obj));
        }

        match &self.object {
            Some(o) => Ok(o.clone()),
            None => bail!(
                "Object {} could not be returned from cache. Loading probably failed in a previous iteration.",
                filename
            ),
        }
    }
}

pub trait Loadable<T> {
    fn load(filename: &str) -> FnResult<T>;
}

impl Loadable<MovementNetDict> for MovementNetDict {
    fn load(filename: &str) -> FnResult<MovementNetDict> {
        let net: MovementNetDict = load_from_file(filename, &SerdeFormat::from_filename(filename))?;
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_parsing_accepts_artifact_entries() {
        let date = date_from_string("2020-06-15").unwrap();
        assert_eq!(date, NaiveDate::from_ymd(2020, 6, 15));
        assert!(date_from_string("not a date").is_err());
        assert!(date_from_string("2020-13-99").is_err());
    }
}
