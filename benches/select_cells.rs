/// Benchmarks for area-weighted cell selection.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use aquifer_anomaly::grid::{
    grid_window, select_cells_in_window, select_cells_in_window_par, PreparedRegion,
};

use geo::{LineString, MultiPolygon, Polygon};

/// Returns a star-shaped polygon with the given number of points centred on (lon, lat).
fn star(lon: f64, lat: f64, radius: f64, points: usize) -> MultiPolygon<f64> {
    let ring: Vec<(f64, f64)> = (0..=2 * points)
        .map(|i| {
            let angle = std::f64::consts::PI * i as f64 / points as f64;
            let r = if i % 2 == 0 { radius } else { radius / 2.0 };
            (lon + r * angle.cos(), lat + r * angle.sin())
        })
        .collect();
    MultiPolygon::new(vec![Polygon::new(LineString::from(ring), vec![])])
}

fn criterion_benchmark(c: &mut Criterion) {
    let cell_size = 0.25;
    let lat: Vec<f64> = (0..720).map(|i| -89.875 + i as f64 * cell_size).collect();
    let lon: Vec<f64> = (0..1440).map(|i| -179.875 + i as f64 * cell_size).collect();
    for radius in [1.0, 4.0, 16.0] {
        let region = PreparedRegion::new(star(135.0, -25.0, radius, 12));
        let window = grid_window(region.bounds(), &lat, &lon, cell_size, 2.0);
        let name = format!("select_cells(radius {}, {} cells)", radius, window.len());
        c.bench_function(&name, |b| {
            b.iter(|| {
                select_cells_in_window(black_box(&region), &lat, &lon, &window, cell_size)
            })
        });
        let name = format!("select_cells_par(radius {}, {} cells)", radius, window.len());
        c.bench_function(&name, |b| {
            b.iter(|| {
                select_cells_in_window_par(black_box(&region), &lat, &lon, &window, cell_size)
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
