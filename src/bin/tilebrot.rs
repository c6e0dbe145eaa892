// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

extern crate clap;
extern crate crossbeam;
extern crate env_logger;
extern crate log;
extern crate num;
extern crate num_cpus;
extern crate tilebrot;

use clap::{App, Arg, ArgMatches};
use log::{info, warn};
use num::Complex;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tilebrot::partition::distribute;
use tilebrot::wire::new_identifier;
use tilebrot::{
    Assembler, Bus, CancelMessage, CancellationToken, Error, FractalKind, Generator, Raster, RequestMessage,
    Router, RouterSettings, Settings, Transport, Wire, Worker,
};

/// How long the client waits for the next tile before giving up.
const IDLE: Duration = Duration::from_secs(60);

fn parse_pair<T>(s: &str, separator: char) -> Option<(T, T)>
where
    T: FromStr,
{
    match s.find(separator) {
        None => None,
        Some(index) => match (T::from_str(&s[..index]), T::from_str(&s[index + 1..])) {
            (Ok(l), Ok(r)) => Some((l, r)),
            _ => None,
        },
    }
}

fn parse_complex(s: &str) -> Option<Complex<f64>> {
    match parse_pair(s, ',') {
        Some((re, im)) => Some(Complex { re, im }),
        None => None,
    }
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const OUTPUT: &str = "output";
const SIZE: &str = "size";
const UPPERLEFT: &str = "upperleft";
const RIGHT: &str = "right";
const ITERATIONS: &str = "iterations";
const WORKERS: &str = "workers";
const TILE: &str = "tile";
const FRACTAL: &str = "fractal";
const CONSTANT: &str = "constant";
const LOCAL: &str = "local";
const FORWARD_CANCEL: &str = "forward-cancel";
const DUMP_REQUEST: &str = "dump-request";

fn args(default_workers: &str) -> ArgMatches {
    let max_workers = num_cpus::get() * 4;

    App::new("tilebrot")
        .version("0.1.0")
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Tiled, distributed Mandelbrot renderer")
        .arg(
            Arg::with_name(OUTPUT)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .default_value("mandelbrot.ppm")
                .help("Output file; .ppm is plain text, other extensions go through the image encoders"),
        )
        .arg(
            Arg::with_name(SIZE)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value("1024x1024")
                .validator(|s| validate_pair::<u16>(&s, 'x', "Could not parse output image size"))
                .help("Size of output image"),
        )
        .arg(
            Arg::with_name(UPPERLEFT)
                .long(UPPERLEFT)
                .allow_hyphen_values(true)
                .short("u")
                .takes_value(true)
                .default_value("-2,-2")
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse upper left corner"))
                .help("Left and top edges on the complex plane"),
        )
        .arg(
            Arg::with_name(RIGHT)
                .long(RIGHT)
                .allow_hyphen_values(true)
                .short("r")
                .takes_value(true)
                .default_value("2")
                .validator(|s| {
                    f64::from_str(&s)
                        .map(|_| ())
                        .map_err(|_| "Could not parse right edge".to_string())
                })
                .help("Right edge on the complex plane; the bottom follows the image's aspect ratio"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .default_value("500")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        1_000_000,
                        "Could not parse iteration count",
                        "Iteration count must be between 1 and 1000000",
                    )
                })
                .help("Iteration budget per point"),
        )
        .arg(
            Arg::with_name(WORKERS)
                .long(WORKERS)
                .short("w")
                .takes_value(true)
                .default_value(default_workers)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_workers,
                        "Could not parse worker count",
                        &format!("Worker count must be between 1 and {}", max_workers),
                    )
                })
                .help("Number of workers behind the router"),
        )
        .arg(
            Arg::with_name(TILE)
                .long(TILE)
                .short("t")
                .takes_value(true)
                .default_value("128x128")
                .validator(|s| validate_pair::<u16>(&s, 'x', "Could not parse tile size"))
                .help("Size of the tiles each worker computes"),
        )
        .arg(
            Arg::with_name(FRACTAL)
                .long(FRACTAL)
                .short("f")
                .takes_value(true)
                .possible_values(&["mandelbrot", "julia"])
                .default_value("mandelbrot")
                .help("Escape-time fractal to render"),
        )
        .arg(
            Arg::with_name(CONSTANT)
                .long(CONSTANT)
                .allow_hyphen_values(true)
                .short("k")
                .takes_value(true)
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse Julia constant"))
                .help("Constant of the Julia set, as re,im"),
        )
        .arg(
            Arg::with_name(LOCAL)
                .long(LOCAL)
                .help("Render in-process, without router or workers"),
        )
        .arg(
            Arg::with_name(FORWARD_CANCEL)
                .long(FORWARD_CANCEL)
                .help("Have the router pass Cancel messages on to the workers"),
        )
        .arg(
            Arg::with_name(DUMP_REQUEST)
                .long(DUMP_REQUEST)
                .help("Print the encoded request instead of rendering"),
        )
        .get_matches()
}

fn value<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, String> {
    matches
        .value_of(name)
        .ok_or_else(|| format!("missing --{}", name))
}

fn settings(matches: &ArgMatches) -> Result<Settings, String> {
    let size: (usize, usize) =
        parse_pair(value(matches, SIZE)?, 'x').ok_or("Error parsing image dimensions")?;
    let tile: (i64, i64) = parse_pair(value(matches, TILE)?, 'x').ok_or("Error parsing tile size")?;
    let upperleft =
        parse_complex(value(matches, UPPERLEFT)?).ok_or("Error parsing upper left point")?;
    let right = f64::from_str(value(matches, RIGHT)?).map_err(|e| e.to_string())?;
    let mut fractal = FractalKind::from_str(value(matches, FRACTAL)?)?;
    if let (FractalKind::Julia(_), Some(k)) = (fractal, matches.value_of(CONSTANT)) {
        fractal = FractalKind::Julia(parse_complex(k).ok_or("Error parsing Julia constant")?);
    }

    let defaults = Settings::default();
    Ok(Settings {
        width: size.0,
        height: size.1,
        tile_width: tile.0,
        tile_height: tile.1,
        left: upperleft.re,
        top: upperleft.im,
        right,
        fractal,
        output: PathBuf::from(value(matches, OUTPUT)?),
        max_iterations: u32::from_str(value(matches, ITERATIONS)?).map_err(|e| e.to_string())?,
        workers: usize::from_str(value(matches, WORKERS)?).map_err(|e| e.to_string())?,
        router: RouterSettings {
            forward_cancel: matches.is_present(FORWARD_CANCEL),
        },
        ..defaults
    })
}

fn render_local(settings: &Settings, request: &RequestMessage) -> tilebrot::Result<bool> {
    let view = request.header.fractal_view();
    let mut raster = Raster::new(view.pixel_view);
    let token = CancellationToken::new();
    let tasks = distribute(
        request.identifier(),
        view,
        settings.tile_width,
        settings.tile_height,
        &token,
    );
    let generator = Generator::new(settings.fractal.escape_function(request.max_iterations));
    let outcomes = generator.invoke(tasks, &mut raster);
    info!("rendered {} tiles locally", outcomes.len());
    raster.export(&settings.output)?;
    Ok(outcomes.iter().all(|o| o.is_completed()))
}

fn render_distributed(settings: &Settings, request: &RequestMessage) -> tilebrot::Result<bool> {
    let bus = Bus::new();
    let topics = &settings.topics;
    let endpoints = topics.worker_endpoints(settings.workers);

    let from_client = bus.subscribe(&topics.requests)?;
    let from_workers = bus.subscribe(&topics.results)?;
    let to_client = bus.subscribe(&topics.responses)?;
    let mut inboxes = Vec::with_capacity(endpoints.len());
    for endpoint in &endpoints {
        inboxes.push(bus.subscribe(endpoint)?);
    }

    let router = Router::new(
        bus.clone(),
        endpoints.clone(),
        topics.responses.clone(),
        settings.router,
    );
    let workers: Vec<Worker<Bus>> = inboxes
        .iter()
        .map(|_| {
            Worker::new(
                bus.clone(),
                topics.results.clone(),
                (settings.tile_width, settings.tile_height),
                settings.fractal,
            )
            .with_max_pixels(settings.max_request_pixels)
        })
        .collect();
    let assembler = Assembler::new(request.identifier(), request.header.pixel_view);
    let cancel = CancelMessage::new(request.identifier())?.encode();
    info!(
        "job {}: {}x{} across {} workers",
        request.identifier(),
        settings.width,
        settings.height,
        workers.len()
    );

    let complete = crossbeam::scope(|scope| {
        let router = &router;
        scope.spawn(move |_| router.serve(from_client));
        scope.spawn(move |_| router.serve(from_workers));
        for (worker, inbox) in workers.iter().zip(inboxes) {
            scope.spawn(move |_| {
                if let Err(e) = worker.serve(inbox) {
                    warn!("worker: {}", e);
                }
            });
        }
        let complete = bus
            .publish(&topics.requests, request.encode().as_bytes())
            .and_then(|_| assembler.collect(&to_client, IDLE));
        if let Ok(false) = complete {
            for endpoint in &endpoints {
                if let Err(e) = bus.publish(endpoint, cancel.as_bytes()) {
                    warn!("could not cancel on {}: {}", endpoint, e);
                }
            }
        }
        bus.close_all();
        complete
    })
    .map_err(|_| Error::Panicked("render"))??;

    assembler.export(&settings.output)?;
    Ok(complete)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let default_workers = num_cpus::get().to_string();
    let matches = args(&default_workers);
    let settings = match settings(&matches) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    let request = match RequestMessage::new(new_identifier(), settings.fractal_view(), settings.max_iterations) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if matches.is_present(DUMP_REQUEST) {
        print!("{}", request.encode());
        return;
    }

    let rendered = if matches.is_present(LOCAL) {
        render_local(&settings, &request)
    } else {
        render_distributed(&settings, &request)
    };
    match rendered {
        Ok(true) => info!("wrote {}", settings.output.display()),
        Ok(false) => {
            warn!("image incomplete; wrote what arrived to {}", settings.output.display());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Render failure: {}", e);
            std::process::exit(1);
        }
    }
}
