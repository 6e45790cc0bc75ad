use anyhow::Result;
use clap::Parser;
use det_data::{cache_options, parse_dataset, Config};
use log::LevelFilter;
use prettytable::{cell, row, Table};
use std::{
    env,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Parser)]
enum Opts {
    /// Parse the dataset and print the size of each split.
    Parse {
        /// configuration file
        config_file: PathBuf,
    },
    /// Print the classes and their label ids.
    Classes {
        /// configuration file
        config_file: PathBuf,
    },
    /// Remove the cached records of the dataset.
    ClearCache {
        /// configuration file
        config_file: PathBuf,
    },
}

fn main() -> Result<()> {
    let mut logger = pretty_env_logger::formatted_builder();
    match env::var("RUST_LOG") {
        Ok(filters) => logger.parse_filters(&filters),
        Err(_) => logger.filter_level(LevelFilter::Info),
    };
    logger.init();

    match Opts::parse() {
        Opts::Parse { config_file } => {
            parse(config_file)?;
        }
        Opts::Classes { config_file } => {
            classes(config_file)?;
        }
        Opts::ClearCache { config_file } => {
            clear_cache(config_file)?;
        }
    }

    Ok(())
}

fn parse(config_file: impl AsRef<Path>) -> Result<()> {
    let config = Config::open(config_file)?;
    let dataset = parse_dataset(&config)?;

    let mut table = Table::new();
    table.add_row(row!["split", "records", "objects"]);

    dataset.splits.iter().enumerate().for_each(|(index, split)| {
        let num_objects: usize = split.iter().map(|record| record.num_objects()).sum();
        table.add_row(row![index, split.len(), num_objects]);
    });
    table.add_row(row!["total", dataset.num_records(), dataset.num_objects()]);

    table.printstd();
    println!("{} image ids allocated", dataset.keys.len());

    Ok(())
}

fn classes(config_file: impl AsRef<Path>) -> Result<()> {
    let config = Config::open(config_file)?;
    let class_map = match config.dataset.class_map()? {
        Some(class_map) => class_map,
        None => {
            println!("the dataset has no classes");
            return Ok(());
        }
    };

    let mut table = Table::new();
    table.add_row(row!["label id", "class", "whitelisted"]);

    class_map.classes().iter().for_each(|name| {
        let label_id = class_map
            .label_id(name)
            .map(|id| id.to_string())
            .unwrap_or_default();
        table.add_row(row![label_id, name, class_map.is_whitelisted(name)]);
    });

    table.printstd();
    Ok(())
}

fn clear_cache(config_file: impl AsRef<Path>) -> Result<()> {
    let config = Config::open(config_file)?;
    let options = match cache_options(&config)? {
        Some(options) => options,
        None => {
            println!("cache is not enabled");
            return Ok(());
        }
    };

    if options.cache.remove(&options.key)? {
        println!("removed cache entry {}", options.key);
    } else {
        println!("cache entry {} does not exist", options.key);
    }

    Ok(())
}
