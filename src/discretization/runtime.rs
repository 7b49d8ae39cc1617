//! Runtime basis/quadrature tables and element geometry.
//!
//! The reference cell is `[-1, 1]^2` with `xi` along the radius and `eta`
//! along the angle. Basis functions are tensor-product Lagrange polynomials on
//! equispaced nodes; local node `(a, b)` is number `b * (p + 1) + a`. Cell
//! geometry uses the bilinear map of the four vertices, ordered
//! counter-clockwise from `(xi, eta) = (-1, -1)`.

use crate::cdr_error::CdrError;

/// Tensor-product Lagrange basis of order `p` on the reference square.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LagrangeBasis {
    order: usize,
}

impl LagrangeBasis {
    pub fn new(order: usize) -> Self {
        Self { order }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of basis functions per element.
    pub fn num_nodes(&self) -> usize {
        (self.order + 1) * (self.order + 1)
    }

    /// Reference coordinate of 1-D node `m`.
    fn node(&self, m: usize) -> f64 {
        -1.0 + 2.0 * m as f64 / self.order as f64
    }

    /// 1-D Lagrange polynomial `m` and its derivative at `x`.
    fn eval_1d(&self, m: usize, x: f64) -> (f64, f64) {
        let xm = self.node(m);
        let mut value = 1.0;
        let mut derivative = 0.0;
        for k in (0..=self.order).filter(|&k| k != m) {
            let xk = self.node(k);
            let factor = (x - xk) / (xm - xk);
            derivative = derivative * factor + value / (xm - xk);
            value *= factor;
        }
        (value, derivative)
    }

    /// Values and reference gradients `[d/dxi, d/deta]` of all basis functions at `point`.
    pub fn tabulate_point(&self, point: [f64; 2]) -> (Vec<f64>, Vec<[f64; 2]>) {
        let n = self.order + 1;
        let xi: Vec<(f64, f64)> = (0..n).map(|a| self.eval_1d(a, point[0])).collect();
        let eta: Vec<(f64, f64)> = (0..n).map(|b| self.eval_1d(b, point[1])).collect();
        let mut values = Vec::with_capacity(n * n);
        let mut gradients = Vec::with_capacity(n * n);
        for (vb, db) in &eta {
            for (va, da) in &xi {
                values.push(va * vb);
                gradients.push([da * vb, va * db]);
            }
        }
        (values, gradients)
    }

    /// Basis values at `point`.
    pub fn values_at(&self, point: [f64; 2]) -> Vec<f64> {
        self.tabulate_point(point).0
    }
}

/// Quadrature rule on the reference square.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadratureRule {
    pub points: Vec<[f64; 2]>,
    pub weights: Vec<f64>,
}

impl QuadratureRule {
    /// Tensor Gauss–Legendre rule with `n` points per direction.
    pub fn gauss(n: usize) -> Self {
        let (x, w) = gauss_legendre_1d(n);
        let mut points = Vec::with_capacity(n * n);
        let mut weights = Vec::with_capacity(n * n);
        for (xb, wb) in x.iter().zip(&w) {
            for (xa, wa) in x.iter().zip(&w) {
                points.push([*xa, *xb]);
                weights.push(wa * wb);
            }
        }
        Self { points, weights }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Gauss–Legendre nodes (ascending) and weights on `[-1, 1]`, by Newton
/// iteration on the Legendre polynomial `P_n`.
pub fn gauss_legendre_1d(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for i in 0..n {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut derivative = 1.0;
        for _ in 0..100 {
            let (mut p0, mut p1) = (1.0, x);
            for k in 2..=n {
                let kf = k as f64;
                let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
                p0 = p1;
                p1 = p2;
            }
            derivative = n as f64 * (x * p1 - p0) / (x * x - 1.0);
            let dx = p1 / derivative;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        nodes[n - 1 - i] = x;
        weights[n - 1 - i] = 2.0 / ((1.0 - x * x) * derivative * derivative);
    }
    (nodes, weights)
}

/// Basis and quadrature tabulated once on the reference cell.
#[derive(Clone, Debug)]
pub struct ElementRuntime {
    pub basis: LagrangeBasis,
    pub quadrature: QuadratureRule,
    /// `[qp][basis]`
    pub values: Vec<Vec<f64>>,
    /// `[qp][basis]`, reference gradients.
    pub gradients: Vec<Vec<[f64; 2]>>,
}

impl ElementRuntime {
    pub fn new(fe_order: usize, points_per_direction: usize) -> Self {
        let basis = LagrangeBasis::new(fe_order);
        let quadrature = QuadratureRule::gauss(points_per_direction);
        let (values, gradients) = quadrature
            .points
            .iter()
            .map(|&p| basis.tabulate_point(p))
            .unzip();
        Self {
            basis,
            quadrature,
            values,
            gradients,
        }
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.basis.num_nodes()
    }

    pub fn n_q_points(&self) -> usize {
        self.quadrature.len()
    }
}

/// Geometric data of one physical cell at the quadrature points.
#[derive(Clone, Debug)]
pub struct ElementTabulation {
    pub physical_points: Vec<[f64; 2]>,
    /// Quadrature weight times `|det J|`.
    pub jxw: Vec<f64>,
    /// `[qp][basis]`, physical gradients.
    pub gradients: Vec<Vec<[f64; 2]>>,
}

/// Bilinear shape functions of the vertex map and their reference gradients.
fn q1_shape(point: [f64; 2]) -> ([f64; 4], [[f64; 2]; 4]) {
    let [xi, eta] = point;
    let values = [
        0.25 * (1.0 - xi) * (1.0 - eta),
        0.25 * (1.0 + xi) * (1.0 - eta),
        0.25 * (1.0 + xi) * (1.0 + eta),
        0.25 * (1.0 - xi) * (1.0 + eta),
    ];
    let gradients = [
        [-0.25 * (1.0 - eta), -0.25 * (1.0 - xi)],
        [0.25 * (1.0 - eta), -0.25 * (1.0 + xi)],
        [0.25 * (1.0 + eta), 0.25 * (1.0 + xi)],
        [-0.25 * (1.0 + eta), 0.25 * (1.0 - xi)],
    ];
    (values, gradients)
}

/// Physical position of reference point `point` in the cell spanned by `vertices`.
pub fn map_point(vertices: &[[f64; 2]; 4], point: [f64; 2]) -> [f64; 2] {
    let (n, _) = q1_shape(point);
    let mut x = [0.0; 2];
    for (v, w) in vertices.iter().zip(n) {
        x[0] += w * v[0];
        x[1] += w * v[1];
    }
    x
}

fn build_jacobian(vertices: &[[f64; 2]; 4], point: [f64; 2]) -> [[f64; 2]; 2] {
    let (_, grads) = q1_shape(point);
    let mut jac = [[0.0; 2]; 2];
    for (v, g) in vertices.iter().zip(grads) {
        for phys in 0..2 {
            for reference in 0..2 {
                jac[phys][reference] += v[phys] * g[reference];
            }
        }
    }
    jac
}

fn invert_jacobian(jac: [[f64; 2]; 2]) -> Result<(f64, [[f64; 2]; 2]), CdrError> {
    let [[a, b], [c, d]] = jac;
    let det = a * d - b * c;
    if det.abs() < f64::EPSILON {
        return Err(CdrError::Mesh("zero Jacobian determinant".to_string()));
    }
    Ok((det, [[d / det, -b / det], [-c / det, a / det]]))
}

/// Geometric terms of the cell spanned by `vertices`.
pub fn tabulate_element(
    runtime: &ElementRuntime,
    vertices: &[[f64; 2]; 4],
) -> Result<ElementTabulation, CdrError> {
    let n_q = runtime.n_q_points();
    let mut physical_points = Vec::with_capacity(n_q);
    let mut jxw = Vec::with_capacity(n_q);
    let mut gradients = Vec::with_capacity(n_q);
    for (qp, &point) in runtime.quadrature.points.iter().enumerate() {
        let (det, inv) = invert_jacobian(build_jacobian(vertices, point))?;
        jxw.push(runtime.quadrature.weights[qp] * det.abs());
        physical_points.push(map_point(vertices, point));
        // grad_x = J^{-T} grad_ref
        gradients.push(
            runtime.gradients[qp]
                .iter()
                .map(|g| {
                    [
                        inv[0][0] * g[0] + inv[1][0] * g[1],
                        inv[0][1] * g[0] + inv[1][1] * g[1],
                    ]
                })
                .collect(),
        );
    }
    Ok(ElementTabulation {
        physical_points,
        jxw,
        gradients,
    })
}
