//! Terminal stand-in for the charting widget.
//!
//! Prints one line per series and a sparkline of the closes, so a chart
//! session can be driven end to end without a GUI.

use coindash_core::chart::ChartSurface;
use coindash_core::domain::Candle;
use coindash_core::indicators::SeriesPoint;

const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Default)]
pub struct TextSurface {
    width: u32,
}

impl ChartSurface for TextSurface {
    fn create(&mut self, width: u32, height: u32) {
        self.width = width;
        println!("chart {width}x{height}");
    }

    fn set_candles(&mut self, candles: &[Candle]) {
        let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
            println!("candles         (none)");
            return;
        };
        println!(
            "candles         {:>5}  {} .. {}  close {:.4}",
            candles.len(),
            crate::format_ms(first.time),
            crate::format_ms(last.time),
            last.close
        );
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        println!("                {}", sparkline(&closes, self.width as usize));
    }

    fn set_overlay(&mut self, name: &str, points: &[SeriesPoint]) {
        print_series("overlay", name, points);
    }

    fn set_pane(&mut self, name: &str, points: &[SeriesPoint]) {
        print_series("pane", name, points);
    }

    fn clear_series(&mut self, _name: &str) {}

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        println!("resize {width}x{height}");
    }

    fn destroy(&mut self) {
        println!("chart closed");
    }
}

fn print_series(kind: &str, name: &str, points: &[SeriesPoint]) {
    match points.last() {
        Some(p) => println!("{kind:<7} {name:<16} {:>5}  last {:.4}", points.len(), p.value),
        None => println!("{kind:<7} {name:<16}     0"),
    }
}

/// The last `width` values, one block character each.
fn sparkline(values: &[f64], width: usize) -> String {
    let tail = &values[values.len().saturating_sub(width.max(1))..];
    let lo = tail.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = tail.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    tail.iter()
        .map(|v| {
            if span <= 0.0 || !span.is_finite() {
                return BLOCKS[0];
            }
            let idx = ((v - lo) / span * (BLOCKS.len() - 1) as f64).round() as usize;
            BLOCKS[idx.min(BLOCKS.len() - 1)]
        })
        .collect()
}
