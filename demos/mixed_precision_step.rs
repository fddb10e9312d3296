//! Mixed precision training steps
//!
//! Fits an element-wise linear model with fp16 loss scaling, value clipping
//! and gradient norm logging configured from YAML.
//!
//! Run with: RUST_LOG=debug cargo run --example mixed_precision_step

use entrenar_precision::autograd::{add, mse, mul};
use entrenar_precision::config::{build_plugin, PrecisionSpec};
use entrenar_precision::optim::{Optimizer, SGD};
use entrenar_precision::plugin::{
    dispatch_run, ModelHandle, Module, RunStage, StepHook, TracingSink, TrainableModule,
};
use entrenar_precision::step::run_optimization_step;
use entrenar_precision::{Result, Tensor};

const SPEC: &str = r#"
precision: 16
gradient_clip_val: 5.0
gradient_clip_algorithm: value
track_grad_norm: 2
scaler:
  initial_scale: 1024.0
  growth_interval: 4
"#;

/// `y = weight * x + bias`, element-wise
struct Linear {
    weight: Tensor,
    bias: Tensor,
}

impl Module for Linear {
    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        vec![
            ("weight".to_string(), self.weight.clone()),
            ("bias".to_string(), self.bias.clone()),
        ]
    }
}

impl TrainableModule for Linear {}

/// Prints the loss the strategy hands to backward
struct LossPrinter;

impl StepHook for LossPrinter {
    fn on_before_backward(&mut self, loss: &Tensor) {
        println!("  scaled loss: {:.2}", loss.item());
    }

    fn name(&self) -> &'static str {
        "LossPrinter"
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let spec = PrecisionSpec::from_yaml(SPEC)?;
    let settings = spec.run_settings();
    let mut plugin = build_plugin(&spec);
    plugin.core_mut().add_hook(LossPrinter);

    let mut model = Linear {
        weight: Tensor::from_vec(vec![0.0; 4], true),
        bias: Tensor::from_vec(vec![0.0; 4], true),
    };
    let mut optimizer = SGD::new(model.parameters(), 0.05, 0.9);
    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
    let y = Tensor::from_vec(vec![3.0, 5.0, 7.0, 9.0], false);
    let mut sink = TracingSink;

    println!("=== Mixed precision ({}) ===\n", plugin.descriptor());

    dispatch_run(plugin.as_mut(), RunStage::Fit, |plugin| {
        let mut handle = ModelHandle::Full(&mut model);
        for step in 0..8 {
            optimizer.zero_grad();
            let report = run_optimization_step(
                plugin,
                &mut handle,
                &mut optimizer,
                0,
                &settings,
                &mut sink,
                |m| {
                    let params = m.named_parameters();
                    let prediction = add(&mul(&params[0].1, &x), &params[1].1);
                    Ok(Some(mse(&prediction, &y)))
                },
            )?;
            println!("step {step}: {:?}", report.outcome);
        }
        Ok(())
    })?;

    println!("\nweight: {:?}", model.weight.to_vec());
    println!("bias:   {:?}", model.bias.to_vec());
    Ok(())
}
