// Least-squares fit of a bias-augmented design matrix via gradient descent
// over autograd-computed gradients.

use ferrograd_core::optim::{gradient_descent, GradientDescent};
use ferrograd_core::FerroGradError;
use ndarray::{ArrayD, IxDyn};

fn main() -> Result<(), FerroGradError> {
    // Feature column plus a ones column for the intercept.
    let x = ArrayD::from_shape_vec(
        IxDyn(&[7, 2]),
        vec![
            1.7, 1.0, //
            1.5, 1.0, //
            2.8, 1.0, //
            5.0, 1.0, //
            1.3, 1.0, //
            2.2, 1.0, //
            1.3, 1.0, //
        ],
    )
    .expect("design matrix shape");
    let y = ArrayD::from_shape_vec(
        IxDyn(&[7, 1]),
        vec![368.0, 340.0, 665.0, 954.0, 331.0, 556.0, 376.0],
    )
    .expect("target shape");

    let theta0 = ArrayD::from_elem(IxDyn(&[2, 1]), 0.0);
    let config = GradientDescent {
        learning_rate: 0.01,
        threshold: 1e-1,
        max_steps: 1_000_000,
    };

    let fitted = gradient_descent(
        vec![theta0],
        |g, params| {
            let features = g.from_array(x.clone());
            features.requires_grad_(false)?;
            let targets = g.from_array(y.clone());
            targets.requires_grad_(false)?;

            let predicted = features.dot(&params[0])?;
            let residual = &predicted - &targets;
            let squared = &residual * &residual;
            squared.sum(None, false)
        },
        &config,
    )?;

    println!("theta = {:?}", fitted[0]);
    Ok(())
}
