use seaway_core::{GeoPoint, RouteRequest};
use seaway_server::config::Config;
use seaway_server::worker::WorkerBoundary;

#[derive(Clone)]
struct CheckRoute {
    name: &'static str,
    start: GeoPoint,
    end: GeoPoint,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let factory_config = config.clone();
    let boundary = WorkerBoundary::new(config.worker_config(), move || {
        factory_config.build_classifier()
    });
    if let Err(err) = boundary.initialize().await {
        println!("Worker not ready: {}", err);
    }

    let routes = vec![
        CheckRoute {
            name: "Seattle -> Bainbridge Island",
            start: GeoPoint::new(47.6026, -122.3393),
            end: GeoPoint::new(47.6231, -122.5107),
        },
        CheckRoute {
            name: "Seattle -> Bremerton",
            start: GeoPoint::new(47.6026, -122.3393),
            end: GeoPoint::new(47.5623, -122.6265),
        },
        CheckRoute {
            name: "Port Townsend -> Victoria",
            start: GeoPoint::new(48.1129, -122.7560),
            end: GeoPoint::new(48.4210, -123.3700),
        },
        CheckRoute {
            name: "Tacoma -> Olympia",
            start: GeoPoint::new(47.2700, -122.4200),
            end: GeoPoint::new(47.0600, -122.9000),
        },
    ];

    for route in routes {
        println!("\n=== {} ===", route.name);
        let request = RouteRequest {
            start: route.start,
            end: route.end,
            max_iterations: config.max_iterations,
        };

        let result = boundary.find_route(request).await;
        if !result.success {
            println!("Result: FAIL");
            println!("Reason: {:?}", result.failure_reason);
            continue;
        }
        println!(
            "Result: OK | waypoints={} distance={:.2}nm",
            result.waypoints.len(),
            result.distance_nm
        );

        let landfalls = find_landfalls(&boundary, &result.waypoints).await;
        if landfalls.is_empty() {
            println!("Water check: PASS");
        } else {
            println!("Water check: FAIL ({})", landfalls.len());
            for landfall in landfalls {
                println!(" - {}", landfall);
            }
        }
    }

    if let Ok(stats) = boundary.worker_stats().await {
        println!(
            "\nCache: hits={} misses={} entries={}",
            stats.cache_hits, stats.cache_misses, stats.cache_entries
        );
    }
    boundary.shutdown().await;
}

/// Re-sample every leg independently of the planner and report where it
/// touches land.
async fn find_landfalls(boundary: &WorkerBoundary, waypoints: &[GeoPoint]) -> Vec<String> {
    let samples = 25usize;
    let mut landfalls = Vec::new();
    for (leg, segment) in waypoints.windows(2).enumerate() {
        for i in 0..=samples {
            let point = segment[0].lerp(&segment[1], i as f64 / samples as f64);
            match boundary.is_water(point).await {
                Ok(true) => {}
                Ok(false) => {
                    landfalls.push(format!(
                        "leg {} land at ({:.5}, {:.5})",
                        leg, point.lat, point.lon
                    ));
                    break;
                }
                Err(err) => {
                    landfalls.push(format!("leg {} unchecked: {}", leg, err));
                    break;
                }
            }
        }
    }
    landfalls
}
