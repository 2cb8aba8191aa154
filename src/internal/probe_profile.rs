#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use hopscotch::{HopscotchTable, NEIGHBORHOOD, TableStats, key_from_index};
use plotters::prelude::*;
use rand::Rng;

// 2^16 home buckets per run
const EXPONENT: u32 = 16;
// Load factors from 0.1 to 0.95
const NUM_LOAD_FACTORS: usize = 10;

/// Outcome of filling one table to a target load factor
struct Run {
    load_factor: f64,
    stored: usize,
    average_offset: f64,
    worst_offset: usize,
    stats: TableStats,
}

fn fill(keys: &[u32], n_keys: usize, load_factor: f64) -> Result<Run, Box<dyn std::error::Error>> {
    let table = HopscotchTable::<12>::init(EXPONENT)?;
    for &index in keys.iter().take(n_keys) {
        // Full neighborhoods are part of what is being measured
        let _ = table.insert(key_from_index(index), u64::from(index));
    }

    let histogram = table.offset_histogram();
    let stored: usize = histogram.iter().sum();
    let weighted: usize = histogram.iter().enumerate().map(|(offset, count)| offset * count).sum();
    let worst_offset = histogram.iter().rposition(|&count| count > 0).unwrap_or(0);
    table.verify()?;

    Ok(Run {
        load_factor,
        stored,
        average_offset: if stored == 0 { 0.0 } else { weighted as f64 / stored as f64 },
        worst_offset,
        stats: table.stats(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let capacity = 1usize << EXPONENT;
    let load_factors: Vec<f64> = (0..NUM_LOAD_FACTORS)
        .map(|i| 0.1 + (0.95 - 0.1) * (i as f64) / ((NUM_LOAD_FACTORS - 1) as f64))
        .collect();
    let num_keys: Vec<usize> =
        load_factors.iter().map(|&load| (capacity as f64 * load) as usize).collect();

    println!("Load factors: {load_factors:?}");
    println!("Number of keys: {num_keys:?}");

    // Same random keys for every load factor
    let mut rng = rand::rng();
    let max_keys_needed = num_keys.iter().copied().max().unwrap_or(0);
    let keys: Vec<u32> = (0..max_keys_needed).map(|_| rng.random()).collect();

    let mut runs = Vec::with_capacity(num_keys.len());
    for (&n_keys, &load_factor) in num_keys.iter().zip(&load_factors) {
        let run = fill(&keys, n_keys, load_factor)?;
        println!(
            "  load {:.2}: stored = {}, avg offset = {:.2}, worst offset = {}, displacements = {} (longest chain {}), table full = {}",
            run.load_factor,
            run.stored,
            run.average_offset,
            run.worst_offset,
            run.stats.displacements,
            run.stats.max_displacement_chain,
            run.stats.table_full
        );
        runs.push(run);
    }

    let font_family = "sans-serif";
    let red = RGBColor(220, 50, 50);
    let blue = RGBColor(50, 90, 220);
    let line_width = 2;
    let marker_size = 4;

    // Plot 1: distance from home bucket
    let root = BitMapBackend::new("home_offset.png", (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Distance of Entries from their Home Bucket", (font_family, 35))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..1.0, 0.0..NEIGHBORHOOD as f64)?;
    chart
        .configure_mesh()
        .x_desc("Load Factor")
        .y_desc("Offset (slots)")
        .axis_desc_style((font_family, 16))
        .draw()?;

    for (label, color, values) in [
        ("Average offset", red, runs.iter().map(|r| r.average_offset).collect::<Vec<_>>()),
        ("Worst offset", blue, runs.iter().map(|r| r.worst_offset as f64).collect::<Vec<_>>()),
    ] {
        let style = ShapeStyle::from(&color).stroke_width(line_width);
        let points: Vec<(f64, f64)> = load_factors.iter().copied().zip(values).collect();
        chart
            .draw_series(LineSeries::new(points.clone(), style))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
        chart.draw_series(points.into_iter().map(|p| Circle::new(p, marker_size, color.filled())))?;
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;
    root.present()?;

    // Plot 2: displacement work and failures
    let root = BitMapBackend::new("displacements.png", (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let max_count = runs
        .iter()
        .map(|r| r.stats.displacements.max(r.stats.table_full))
        .max()
        .unwrap_or(0)
        .max(1) as f64
        * 1.1;
    let mut chart = ChartBuilder::on(&root)
        .caption("Displacements and Failed Inserts", (font_family, 35))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(0.0..1.0, 0.0..max_count)?;
    chart
        .configure_mesh()
        .x_desc("Load Factor")
        .y_desc("Count")
        .axis_desc_style((font_family, 16))
        .draw()?;

    for (label, color, values) in [
        ("Displacements", red, runs.iter().map(|r| r.stats.displacements as f64).collect::<Vec<_>>()),
        ("Table full", blue, runs.iter().map(|r| r.stats.table_full as f64).collect::<Vec<_>>()),
    ] {
        let style = ShapeStyle::from(&color).stroke_width(line_width);
        let points: Vec<(f64, f64)> = load_factors.iter().copied().zip(values).collect();
        chart
            .draw_series(LineSeries::new(points.clone(), style))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
        chart.draw_series(points.into_iter().map(|p| Circle::new(p, marker_size, color.filled())))?;
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;
    root.present()?;

    println!("Charts written to home_offset.png and displacements.png");
    Ok(())
}
