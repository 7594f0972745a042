// Builds a small chain of element-wise operations and prints every node's
// value and gradient after one backward pass.

use ferrograd_core::{FerroGradError, Graph};

fn main() -> Result<(), FerroGradError> {
    let g = Graph::new();

    let a = g.tensor(vec![1.0, 2.0, 3.0], &[3])?;
    let b = g.tensor(vec![4.0, 5.0, 6.0], &[3])?;
    let c = &a + &b;

    let d = g.tensor(vec![7.0, 8.0, 9.0], &[3])?;
    let e = &c * &d;

    let f = g.tensor(vec![10.0, 11.0, 12.0], &[3])?;
    let l = &e / &f;

    println!("L {:?}", l.value());
    println!("f {:?}", f.value());
    println!("e {:?}", e.value());
    println!("d {:?}", d.value());
    println!("c {:?}", c.value());
    println!("b {:?}", b.value());
    println!("a {:?}", a.value());
    println!();

    l.backward()?;

    println!("L_grad {:?}", l.grad());
    println!("f_grad {:?}", f.grad());
    println!("e_grad {:?}", e.grad());
    println!("d_grad {:?}", d.grad());
    println!("c_grad {:?}", c.grad());
    println!("b_grad {:?}", b.grad());
    println!("a_grad {:?}", a.grad());

    Ok(())
}
