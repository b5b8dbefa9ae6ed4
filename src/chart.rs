//! PNG rendering of the monthly activity table.
//!
//! One stacked bar per month, one colored segment per user. Text is drawn
//! with a bundled DejaVu Sans face so rendering does not depend on the
//! fonts installed on the machine.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use plotters::coord::Shift;
use plotters::coord::ranged1d::{IntoSegmentedCoord, SegmentValue};
use plotters::prelude::*;
use plotters::style::FontStyle;
use tracing::{debug, info};

use crate::activity::ActivityTable;
use crate::config::ReportConfig;
use crate::error::{PlurkError, Result};

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

static FONT_REGISTERED: Lazy<std::result::Result<(), String>> = Lazy::new(|| {
    plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES)
        .map_err(|_| "bundled font could not be loaded".to_string())
});

/// Figure size in inches at scale 1.0.
const FIGURE_INCHES: (f64, f64) = (16.0, 8.0);
const BASE_DPI: f64 = 100.0;
const TITLE_PT: f64 = 16.0;
const AXIS_LABEL_PT: f64 = 14.0;
const TICK_PT: f64 = 12.0;
const BAR_WIDTH: f64 = 0.8;

/// Named color map.
///
/// Sequential maps are sampled evenly over their whole range, so the first
/// and last users get the two ends. Qualitative maps hand out their colors
/// in order and wrap around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Palette {
    Viridis,
    Plasma,
    Inferno,
    Magma,
    Cividis,
    Spectral,
    Tab10,
    Tab20,
    Set1,
    Pastel1,
    Dark2,
    Paired,
}

impl Palette {
    pub const ALL: [Self; 12] = [
        Self::Viridis,
        Self::Plasma,
        Self::Inferno,
        Self::Magma,
        Self::Cividis,
        Self::Spectral,
        Self::Tab10,
        Self::Tab20,
        Self::Set1,
        Self::Pastel1,
        Self::Dark2,
        Self::Paired,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Viridis => "viridis",
            Self::Plasma => "plasma",
            Self::Inferno => "inferno",
            Self::Magma => "magma",
            Self::Cividis => "cividis",
            Self::Spectral => "Spectral",
            Self::Tab10 => "tab10",
            Self::Tab20 => "tab20",
            Self::Set1 => "Set1",
            Self::Pastel1 => "Pastel1",
            Self::Dark2 => "Dark2",
            Self::Paired => "Paired",
        }
    }

    #[must_use]
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.name()).collect()
    }

    #[must_use]
    pub const fn is_sequential(self) -> bool {
        matches!(
            self,
            Self::Viridis
                | Self::Plasma
                | Self::Inferno
                | Self::Magma
                | Self::Cividis
                | Self::Spectral
        )
    }

    const fn stops(self) -> &'static [u32] {
        match self {
            Self::Viridis => &[
                0x44_0154, 0x48_2878, 0x3e_4989, 0x31_688e, 0x26_828e, 0x1f_9e89, 0x35_b779,
                0x6e_ce58, 0xb5_de2b, 0xfd_e725,
            ],
            Self::Plasma => &[
                0x0d_0887, 0x46_039f, 0x72_01a8, 0x9c_179e, 0xbd_3786, 0xd8_576b, 0xed_7953,
                0xfb_9f3a, 0xfd_ca26, 0xf0_f921,
            ],
            Self::Inferno => &[
                0x00_0004, 0x1b_0c41, 0x4a_0c6b, 0x78_1c6d, 0xa5_2c60, 0xcf_4446, 0xed_6925,
                0xfb_9b06, 0xf7_d13d, 0xfc_ffa4,
            ],
            Self::Magma => &[
                0x00_0004, 0x18_0f3d, 0x44_0f76, 0x72_1f81, 0x9e_2f7f, 0xcd_4071, 0xf1_605d,
                0xfd_9668, 0xfe_ca8d, 0xfc_fdbf,
            ],
            Self::Cividis => &[
                0x00_224e, 0x12_3570, 0x3b_496c, 0x57_5d6d, 0x70_7173, 0x8a_8678, 0xa5_9c74,
                0xc3_b369, 0xe1_cc55, 0xfe_e838,
            ],
            Self::Spectral => &[
                0x9e_0142, 0xd5_3e4f, 0xf4_6d43, 0xfd_ae61, 0xfe_e08b, 0xff_ffbf, 0xe6_f598,
                0xab_dda4, 0x66_c2a5, 0x32_88bd, 0x5e_4fa2,
            ],
            Self::Tab10 => &[
                0x1f_77b4, 0xff_7f0e, 0x2c_a02c, 0xd6_2728, 0x94_67bd, 0x8c_564b, 0xe3_77c2,
                0x7f_7f7f, 0xbc_bd22, 0x17_becf,
            ],
            Self::Tab20 => &[
                0x1f_77b4, 0xae_c7e8, 0xff_7f0e, 0xff_bb78, 0x2c_a02c, 0x98_df8a, 0xd6_2728,
                0xff_9896, 0x94_67bd, 0xc5_b0d5, 0x8c_564b, 0xc4_9c94, 0xe3_77c2, 0xf7_b6d2,
                0x7f_7f7f, 0xc7_c7c7, 0xbc_bd22, 0xdb_db8d, 0x17_becf, 0x9e_dae5,
            ],
            Self::Set1 => &[
                0xe4_1a1c, 0x37_7eb8, 0x4d_af4a, 0x98_4ea3, 0xff_7f00, 0xff_ff33, 0xa6_5628,
                0xf7_81bf, 0x99_9999,
            ],
            Self::Pastel1 => &[
                0xfb_b4ae, 0xb3_cde3, 0xcc_ebc5, 0xde_cbe4, 0xfe_d9a6, 0xff_ffcc, 0xe5_d8bd,
                0xfd_daec, 0xf2_f2f2,
            ],
            Self::Dark2 => &[
                0x1b_9e77, 0xd9_5f02, 0x75_70b3, 0xe7_298a, 0x66_a61e, 0xe6_ab02, 0xa6_761d,
                0x66_6666,
            ],
            Self::Paired => &[
                0xa6_cee3, 0x1f_78b4, 0xb2_df8a, 0x33_a02c, 0xfb_9a99, 0xe3_1a1c, 0xfd_bf6f,
                0xff_7f00, 0xca_b2d6, 0x6a_3d9a, 0xff_ff99, 0xb1_5928,
            ],
        }
    }

    /// `n` colors for `n` stacked series.
    #[must_use]
    pub fn colors(self, n: usize) -> Vec<RGBColor> {
        let stops = self.stops();
        if self.is_sequential() {
            (0..n).map(|i| sample(stops, linspace_at(i, n))).collect()
        } else {
            (0..n).map(|i| rgb(stops[i % stops.len()])).collect()
        }
    }
}

impl std::fmt::Display for Palette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Palette {
    type Err = PlurkError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PlurkError::UnknownPalette {
                name: wanted.to_string(),
            })
    }
}

#[allow(clippy::cast_precision_loss)]
fn linspace_at(i: usize, n: usize) -> f64 {
    if n <= 1 { 0.0 } else { i as f64 / (n - 1) as f64 }
}

const fn rgb(hex: u32) -> RGBColor {
    RGBColor(
        ((hex >> 16) & 0xff) as u8,
        ((hex >> 8) & 0xff) as u8,
        (hex & 0xff) as u8,
    )
}

/// Linear interpolation between evenly spaced stops, `t` in `[0, 1]`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn sample(stops: &[u32], t: f64) -> RGBColor {
    let last = stops.len() - 1;
    let pos = t.clamp(0.0, 1.0) * last as f64;
    let lo = (pos.floor() as usize).min(last);
    let hi = (lo + 1).min(last);
    let frac = pos - lo as f64;

    let (a, b) = (rgb(stops[lo]), rgb(stops[hi]));
    let mix = |x: u8, y: u8| (f64::from(y) - f64::from(x)).mul_add(frac, f64::from(x)).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Rendering options; see [`ReportConfig`] for defaults.
#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub palette: Palette,
    pub scale: f64,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub label_stride: usize,
}

impl ChartOptions {
    /// Build options from the `[report]` config section.
    ///
    /// # Errors
    /// Returns [`PlurkError::UnknownPalette`] or [`PlurkError::InvalidArgument`]
    /// for values the renderer cannot use.
    pub fn from_config(config: &ReportConfig) -> Result<Self> {
        let options = Self {
            palette: config.palette.parse()?,
            scale: config.scale,
            title: config.title.clone(),
            x_label: config.x_label.clone(),
            y_label: config.y_label.clone(),
            label_stride: config.label_stride,
        };
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(PlurkError::invalid_argument(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        if self.label_stride == 0 {
            return Err(PlurkError::invalid_argument("label stride must be at least 1"));
        }
        Ok(())
    }

    fn dpi(&self) -> f64 {
        BASE_DPI * self.scale / 2.0
    }

    /// Image size in pixels.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn dimensions(&self) -> (u32, u32) {
        let dpi = self.dpi();
        let w = FIGURE_INCHES.0 * self.scale * dpi;
        let h = FIGURE_INCHES.1 * self.scale * dpi;
        (w.round().max(1.0) as u32, h.round().max(1.0) as u32)
    }

    /// Pixel size of a font given in points at scale 2.0.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn font_px(&self, pt: f64) -> u32 {
        (pt * self.scale / 2.0 * self.dpi() / 72.0).round().max(1.0) as u32
    }
}

impl Default for ChartOptions {
    fn default() -> Self {
        let config = ReportConfig::default();
        Self {
            palette: Palette::Tab20,
            scale: config.scale,
            title: config.title,
            x_label: config.x_label,
            y_label: config.y_label,
            label_stride: config.label_stride,
        }
    }
}

/// `combined_activity_<palette>.png`
#[must_use]
pub fn output_file_name(palette: Palette) -> String {
    format!("combined_activity_{}.png", palette.name())
}

/// Render `table` into `output_dir` and return the written path.
///
/// An empty table still produces a titled, labeled chart.
///
/// # Errors
/// Returns an error if the directory cannot be created or the image cannot
/// be drawn or written.
pub fn render_activity_chart(
    table: &ActivityTable,
    options: &ChartOptions,
    output_dir: &Path,
) -> Result<PathBuf> {
    options.validate()?;
    (*FONT_REGISTERED).clone().map_err(PlurkError::ChartError)?;

    std::fs::create_dir_all(output_dir)
        .map_err(|e| PlurkError::path_error("create directory", output_dir, e))?;
    let path = output_dir.join(output_file_name(options.palette));

    let layout = draw(table, options, &path)?;
    debug!(?layout, "Chart layout");
    info!(
        path = %path.display(),
        months = table.months.len(),
        users = table.authors.len(),
        "Wrote activity chart"
    );
    Ok(path)
}

/// Pixel bounds of the drawn parts, in image coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChartLayout {
    plot: (Range<i32>, Range<i32>),
    legend: Option<(Range<i32>, Range<i32>)>,
}

/// Width of the strip right of the plot that holds the legend box: swatch,
/// gap, longest label, padding on both sides and a right margin.
const fn legend_strip_width(label_px: u32, tick_px: u32) -> u32 {
    label_px + tick_px * 3
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn draw(table: &ActivityTable, options: &ChartOptions, path: &Path) -> Result<ChartLayout> {
    let (width, height) = options.dimensions();
    debug!(width, height, palette = %options.palette, "Rendering chart");

    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(PlurkError::chart)?;

    let title_px = options.font_px(TITLE_PT);
    let axis_px = options.font_px(AXIS_LABEL_PT);
    let tick_px = options.font_px(TICK_PT);
    let legend_style = (FONT_FAMILY, f64::from(tick_px)).into_font().color(&BLACK);

    let mut label_px = 0;
    for label in table.authors.iter().map(String::as_str).chain(["User"]) {
        let (w, _) = root
            .estimate_text_size(label, &legend_style)
            .map_err(PlurkError::chart)?;
        label_px = label_px.max(w);
    }
    let strip_px = if table.authors.is_empty() {
        0
    } else {
        legend_strip_width(label_px, tick_px).min(width / 2)
    };
    let (plot_root, legend_root) = root.split_horizontally(width - strip_px);

    let slots = u32::try_from(table.months.len())
        .map_err(|_| PlurkError::chart("too many months to plot"))?
        .max(1);
    let y_max = table.max_month_total();
    let y_top = if y_max == 0 { 1 } else { y_max + y_max.div_ceil(20) };

    let mut chart = ChartBuilder::on(&plot_root)
        .caption(&options.title, (FONT_FAMILY, title_px))
        .margin(title_px)
        .x_label_area_size(tick_px * 3 + axis_px)
        .y_label_area_size(tick_px * 4 + axis_px)
        .build_cartesian_2d((0u32..slots).into_segmented(), 0u64..y_top)
        .map_err(PlurkError::chart)?;

    let stride = options.label_stride;
    let months = &table.months;
    let x_formatter = |value: &SegmentValue<u32>| match value {
        SegmentValue::CenterOf(i) if (*i as usize) % stride == 0 => {
            months.get(*i as usize).cloned().unwrap_or_default()
        }
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots as usize + 1)
        .x_label_formatter(&x_formatter)
        .x_desc(options.x_label.as_str())
        .y_desc(options.y_label.as_str())
        .axis_desc_style((FONT_FAMILY, axis_px))
        .label_style((FONT_FAMILY, tick_px))
        .draw()
        .map_err(PlurkError::chart)?;

    let slot_px = f64::from(chart.plotting_area().dim_in_pixel().0) / f64::from(slots);
    let gap = (slot_px * (1.0 - BAR_WIDTH) / 2.0).round() as u32;
    let colors = options.palette.colors(table.authors.len());

    for (a, &color) in colors.iter().enumerate() {
        let bars = table.counts.iter().enumerate().filter_map(|(m, row)| {
            if row[a] == 0 {
                return None;
            }
            let m = m as u32;
            let base: u64 = row[..a].iter().sum();
            let mut bar = Rectangle::new(
                [
                    (SegmentValue::Exact(m), base),
                    (SegmentValue::Exact(m + 1), base + row[a]),
                ],
                color.filled(),
            );
            bar.set_margin(0, 0, gap, gap);
            Some(bar)
        });
        chart.draw_series(bars).map_err(PlurkError::chart)?;
    }

    let plot = chart.plotting_area().get_pixel_range();
    let legend = if table.authors.is_empty() {
        None
    } else {
        Some(draw_legend(
            &legend_root,
            &table.authors,
            &colors,
            &legend_style,
            plot.1.start,
            label_px,
            tick_px,
        )?)
    };

    root.present().map_err(PlurkError::chart)?;
    Ok(ChartLayout { plot, legend })
}

/// Boxed "User" legend, top-aligned with the plot, one row per series.
#[allow(clippy::cast_possible_wrap)]
fn draw_legend(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    authors: &[String],
    colors: &[RGBColor],
    style: &TextStyle<'_>,
    top: i32,
    label_px: u32,
    tick_px: u32,
) -> Result<(Range<i32>, Range<i32>)> {
    let tick = tick_px as i32;
    let pad = tick / 2;
    let row = tick * 3 / 2;
    let rows = i32::try_from(authors.len() + 1).unwrap_or(i32::MAX);
    let box_w = tick * 2 + pad + label_px as i32;
    let box_h = pad * 2 + row * rows;

    area.draw(&Rectangle::new([(0, top), (box_w, top + box_h)], WHITE.filled()))
        .map_err(PlurkError::chart)?;
    area.draw(&Rectangle::new(
        [(0, top), (box_w, top + box_h)],
        BLACK.stroke_width(1),
    ))
    .map_err(PlurkError::chart)?;
    area.draw(&Text::new("User", (pad, top + pad), style.clone()))
        .map_err(PlurkError::chart)?;

    let mut y = top + pad + row;
    for (author, color) in authors.iter().zip(colors) {
        area.draw(&Rectangle::new([(pad, y), (pad + tick, y + tick)], color.filled()))
            .map_err(PlurkError::chart)?;
        area.draw(&Text::new(author.as_str(), (pad + tick + pad, y), style.clone()))
            .map_err(PlurkError::chart)?;
        y += row;
    }

    let (x0, y0) = area.get_base_pixel();
    Ok((x0..x0 + box_w, y0 + top..y0 + top + box_h))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("viridis".parse::<Palette>().unwrap(), Palette::Viridis);
        assert_eq!("SPECTRAL".parse::<Palette>().unwrap(), Palette::Spectral);
        assert_eq!(" Tab20 ".parse::<Palette>().unwrap(), Palette::Tab20);
        assert!(matches!(
            "rainbow".parse::<Palette>(),
            Err(PlurkError::UnknownPalette { .. })
        ));
    }

    #[test]
    fn qualitative_palettes_wrap() {
        let colors = Palette::Dark2.colors(10);
        assert_eq!(colors[0], RGBColor(0x1b, 0x9e, 0x77));
        assert_eq!(colors[8], colors[0]);
        assert_eq!(colors[9], colors[1]);
    }

    #[test]
    fn sequential_palettes_span_the_range() {
        let colors = Palette::Viridis.colors(3);
        assert_eq!(colors[0], RGBColor(0x44, 0x01, 0x54));
        assert_eq!(colors[2], RGBColor(0xfd, 0xe7, 0x25));
        // halfway between the 5th and 6th stop
        assert_eq!(colors[1], RGBColor(0x23, 0x90, 0x8c));

        assert_eq!(Palette::Magma.colors(1), vec![RGBColor(0, 0, 4)]);
        assert!(Palette::Plasma.colors(0).is_empty());
    }

    #[test]
    fn size_follows_scale() {
        let mut options = ChartOptions::default();
        assert_eq!(options.dimensions(), (3200, 1600));
        assert_eq!(options.font_px(TITLE_PT), 22);
        options.scale = 1.0;
        assert_eq!(options.dimensions(), (800, 400));
    }

    #[test]
    fn file_name_uses_palette() {
        assert_eq!(output_file_name(Palette::Set1), "combined_activity_Set1.png");
    }

    #[test]
    fn empty_table_renders_valid_png() {
        let dir = tempfile::tempdir().unwrap();
        let path =
            render_activity_chart(&ActivityTable::default(), &ChartOptions::default(), dir.path())
                .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[..8], PNG_SIGNATURE);

        // same size as a chart with data: IHDR width and height
        let be = |at: usize| u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap());
        assert_eq!((be(16), be(20)), ChartOptions::default().dimensions());
    }

    #[test]
    fn renders_stacked_table() {
        let table = ActivityTable {
            months: vec!["2024-01".into(), "2024-02".into(), "2024-03".into()],
            authors: vec!["A".into(), "B".into()],
            counts: vec![vec![3, 1], vec![0, 0], vec![2, 5]],
        };
        let options = ChartOptions {
            palette: Palette::Viridis,
            scale: 1.0,
            ..ChartOptions::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = render_activity_chart(&table, &options, dir.path()).unwrap();
        assert!(path.ends_with("combined_activity_viridis.png"));
        assert_eq!(std::fs::read(&path).unwrap()[..8], PNG_SIGNATURE);
    }

    #[test]
    fn bundled_font_registers() {
        assert!(FONT_REGISTERED.is_ok());
    }

    #[test]
    fn legend_sits_right_of_the_plot() {
        // busiest month first, so the tallest bar touches the top left corner
        let mut counts = vec![vec![0; 8]; 6];
        counts[0] = vec![20, 18, 16, 14, 12, 10, 9, 9];
        counts[2] = vec![2; 8];
        let table = ActivityTable {
            months: (1..=6).map(|m| format!("2023-{m:02}")).collect(),
            authors: ["Alice", "Bob", "Carol", "Dave", "Erin", "Frank", "Grace", "Heidi"]
                .map(String::from)
                .to_vec(),
            counts,
        };
        assert_eq!(table.month_totals()[0], 108);

        (*FONT_REGISTERED).clone().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = ChartOptions::default();
        let layout = draw(&table, &options, &dir.path().join("chart.png")).unwrap();

        let (plot_x, plot_y) = layout.plot;
        let (legend_x, legend_y) = layout.legend.unwrap();
        assert!(legend_x.start >= plot_x.end, "{legend_x:?} overlaps {plot_x:?}");
        assert_eq!(legend_y.start, plot_y.start);
        let (width, height) = options.dimensions();
        assert!(legend_x.end <= i32::try_from(width).unwrap());
        assert!(legend_y.end <= i32::try_from(height).unwrap());
    }

    #[test]
    fn empty_table_has_no_legend() {
        (*FONT_REGISTERED).clone().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let layout = draw(
            &ActivityTable::default(),
            &ChartOptions::default(),
            &dir.path().join("chart.png"),
        )
        .unwrap();
        assert!(layout.legend.is_none());
    }

    #[test]
    fn rejects_bad_scale() {
        let options = ChartOptions {
            scale: -1.0,
            ..ChartOptions::default()
        };
        let dir = tempfile::tempdir().unwrap();
        assert!(render_activity_chart(&ActivityTable::default(), &options, dir.path()).is_err());
    }
}
