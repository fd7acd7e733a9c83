use clap::Parser;
use geocover::{CoverageClusterer, PostcodeDatabase, DEFAULT_RADIUS_KM};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::{
    error::Error,
    fmt::{self, Display},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                                     Command Line Options
 *-----------------------------------------------------------------------------------------------*/

///
/// Group geocoded postcodes into search clusters.
///
/// All existing clusters in the database are thrown away and rebuilt, so that every postcode with
/// a location is within the search radius of exactly one cluster center.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "createclusters")]
#[clap(author, version, about)]
struct CreateClustersOptions {
    /// The path to the postcode database file.
    ///
    /// If this is not specified, then the program will check for it in the "POSTCODE_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "POSTCODE_DB")]
    database: PathBuf,

    /// The search radius around each cluster center in kilometers.
    #[clap(short, long)]
    #[clap(env = "CLUSTER_RADIUS_KM")]
    #[clap(parse(try_from_str=parse_radius))]
    #[clap(default_value_t=DEFAULT_RADIUS_KM)]
    radius_km: f64,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn parse_radius(radius: &str) -> Result<f64, String> {
    let value: f64 = radius
        .parse()
        .map_err(|_| format!("Argument is not a number: {}", radius))?;

    CoverageClusterer::new(value).map_err(|err| err.to_string())?;

    Ok(value)
}

impl Display for CreateClustersOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "    Database: {}", self.database.display())?;
        writeln!(f, "      Radius: {} km", self.radius_km)?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    let opts = CreateClustersOptions::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .with_module_level("geocover", level)
        .with_module_level("createclusters", level)
        .init()?;

    if opts.verbose {
        info!("{}", opts);
    }

    info!("Starting cluster generation");

    let mut db = PostcodeDatabase::connect(&opts.database)?;
    let clusterer = CoverageClusterer::new(opts.radius_km)?;

    let clusters = clusterer.regenerate(&mut db)?;
    info!("Successfully generated {} clusters", clusters.len());

    let stats = db.cluster_stats()?;
    info!("Cluster Statistics:");
    for line in stats.to_string().lines() {
        info!("{}", line);
    }

    Ok(())
}
