// src/viewer.rs
use eframe::egui;
use egui::Color32;
use egui_plot::{Line, Plot, PlotPoints};

use crate::drivers::plot::{CURRENT_AXIS_LABEL, TIME_AXIS_LABEL};
use crate::drivers::{BenchError, SampleSeries, SummaryStats};

pub struct LeakagePlotApp {
    title: String,
    points: Vec<[f64; 2]>,
    summary: Option<SummaryStats>,
}

impl LeakagePlotApp {
    pub fn new(series: &SampleSeries, title: &str, summary: Option<SummaryStats>) -> Self {
        let points = series
            .iter()
            .map(|sample| [sample.time_s, sample.measured_ma])
            .collect();
        Self {
            title: title.to_owned(),
            points,
            summary,
        }
    }
}

impl eframe::App for LeakagePlotApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("title_bar").show(ctx, |ui| {
            ui.heading(&self.title);
            if let Some(summary) = &self.summary {
                ui.horizontal_wrapped(|ui| {
                    ui.label(format!("Mean: {:.3} mA", summary.mean));
                    ui.separator();
                    ui.label(format!("Peak to peak: {:.3} mA", summary.peak_to_peak));
                    ui.separator();
                    ui.label(format!("Mean Error: {:.3} mA", summary.mean_absolute_error));
                    ui.separator();
                    ui.label(format!("Std: {:.3} mA", summary.std_dev));
                });
            }
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            Plot::new("leakage_plot")
                .x_axis_label(TIME_AXIS_LABEL)
                .y_axis_label(CURRENT_AXIS_LABEL)
                .auto_bounds_x()
                .auto_bounds_y()
                .show(ui, |plot_ui| {
                    plot_ui.line(
                        Line::new(PlotPoints::new(self.points.clone()))
                            .color(Color32::from_rgb(31, 119, 180))
                            .name("Leakage Current"),
                    );
                });
        });
    }
}

/// Opens a native window with the series and blocks until it is closed.
pub fn show_leakage_plot(
    series: &SampleSeries,
    title: &str,
    summary: Option<SummaryStats>,
) -> Result<(), BenchError> {
    if series.is_empty() {
        return Err(BenchError::Plot("sample series has no samples".into()));
    }
    let app = LeakagePlotApp::new(series, title, summary);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 500.0])
            .with_title(title),
        ..Default::default()
    };
    eframe::run_native("LDC Bench", options, Box::new(move |_cc| Box::new(app)))
        .map_err(|err| BenchError::Plot(err.to_string()))
}
