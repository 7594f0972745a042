pub mod gradient_descent;

pub use gradient_descent::{gradient_descent, GradientDescent};
