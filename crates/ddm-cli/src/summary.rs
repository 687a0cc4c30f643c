use console::Style;
use ddm_core::fit::{DecayModel, DecaySeed, FitStatus};
use ddm_core::pipeline::{AnalysisConfig, AnalysisOutput};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            warning: Style::new().yellow().bold(),
            path: Style::new().underlined(),
        }
    }
}

const RULE: &str = "\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}";

pub fn print_analysis_summary(config: &AnalysisConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("DDM Analysis"));
    println!("  {}", s.title.apply_to(RULE));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(config.input.display())
    );
    match config.fps {
        Some(fps) => println!(
            "  {:<14}{}",
            s.label.apply_to("Frame rate"),
            s.value.apply_to(format!("{fps} fps"))
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Frame rate"),
            s.disabled.apply_to("from recording")
        ),
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Pixel size"),
        s.value.apply_to(format!("{} µm", config.pixel_size))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Channel"),
        s.method.apply_to(config.channel)
    );
    println!();

    // Sampling
    let sampling = &config.sampling;
    println!("  {}", s.header.apply_to("Sampling"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Per decade"),
        s.value.apply_to(sampling.points_per_decade)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Couples"),
        s.value.apply_to(sampling.max_couples)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Workers"),
        if sampling.workers == 0 {
            s.method.apply_to("all cores".to_string())
        } else {
            s.value.apply_to(sampling.workers.to_string())
        }
    );
    match sampling.tmax {
        Some(tmax) => println!(
            "    {:<12}{}",
            s.label.apply_to("Fit lags"),
            s.value.apply_to(format!("first {tmax}"))
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Fit lags"),
            s.disabled.apply_to("all")
        ),
    }
    println!();

    // Fitting
    println!("  {}", s.header.apply_to("Fitting"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Model"),
        s.method.apply_to(config.decay.model)
    );
    let seed = match (config.decay.seed, config.decay.model) {
        (DecaySeed::Explicit(p), _) => format!("{p:?}"),
        (DecaySeed::ColumnExtrema, DecayModel::DoubleExponential) => "column extrema".into(),
        (DecaySeed::ColumnExtrema, DecayModel::SingleExponential) | (DecaySeed::HalfRise, _) => {
            "half rise".into()
        }
    };
    println!(
        "    {:<12}{}",
        s.label.apply_to("Seed"),
        s.value.apply_to(seed)
    );
    if config.decay.reduce_unresolved && config.decay.model == DecayModel::DoubleExponential {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Fallback"),
            s.value.apply_to("single exponential where unresolved")
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Tau"),
        s.method.apply_to(config.scaling.channel)
    );
    match config.scaling.window {
        Some(w) => println!(
            "    {:<12}{}",
            s.label.apply_to("q window"),
            s.value.apply_to(format!("[{}, {}) µm⁻¹", w.q_min, w.q_max))
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("q window"),
            s.disabled.apply_to("all q > 0")
        ),
    }
    println!();
}

pub fn print_results(output: &AnalysisOutput) {
    let s = Styles::new();
    let fit = &output.scaling;

    println!("  {}", s.title.apply_to("Results"));
    println!("  {}", s.title.apply_to(RULE));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Lags"),
        s.value.apply_to(format!(
            "{} of {} fitted ({:.3} s to {:.3} s)",
            output.fitted_lags,
            output.lag_times.len(),
            output.fitted_lag_times().first().copied().unwrap_or_default(),
            output.fitted_lag_times().last().copied().unwrap_or_default()
        ))
    );
    let flagged = output.decay.bin_count() - output.decay.count(FitStatus::Converged);
    println!(
        "  {:<14}{}",
        s.label.apply_to("Bins"),
        if flagged == 0 {
            s.value
                .apply_to(format!("{} fitted", output.decay.bin_count()))
        } else {
            s.warning.apply_to(format!(
                "{} fitted, {flagged} flagged",
                output.decay.bin_count()
            ))
        }
    );
    let q_lo = output.wavevectors.get(fit.iq_min).copied().unwrap_or_default();
    let q_hi = output
        .wavevectors
        .get(fit.iq_max.saturating_sub(1))
        .copied()
        .unwrap_or_default();
    println!(
        "  {:<14}{}",
        s.label.apply_to("q range"),
        s.value.apply_to(format!(
            "{q_lo:.2} to {q_hi:.2} µm⁻¹ ({} bins)",
            fit.points
        ))
    );
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Exponent"),
        s.value.apply_to(format!("{:.5}", fit.exponent))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Prefactor"),
        s.value.apply_to(format!("{:.2}", fit.prefactor))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("D"),
        s.method.apply_to(format!(
            "{:.5} ± {:.5} µm²/s",
            fit.diffusion, fit.diffusion_error
        ))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Diameter"),
        s.method.apply_to(format!(
            "{:.5} ± {:.5} µm",
            output.particle.diameter_um, output.particle.error_um
        ))
    );
    println!();
}
