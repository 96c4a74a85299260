use std::ops::Range;

use super::formulation::{Formulation, Var, VarId, VarKind};

/// Declares one variable for every element of a rectangular index domain, returning them as
/// nested vectors indexed the same way as the domain.
pub trait AddVars {
    type Out;

    /// Create a variable with a closure
    fn vars_with<F: FnMut(Self) -> Var>(&self, func: F) -> Self::Out
    where
        Self: Sized;

    /// Create a variable for any type, identified by `id`
    fn vars<F: FnMut(Self) -> VarId>(
        &self,
        model: &mut Formulation,
        kind: VarKind,
        bounds: &Range<f64>,
        mut id: F,
    ) -> Self::Out
    where
        Self: Sized,
    {
        self.vars_with(|index| model.add_var(id(index), kind, bounds.clone()))
    }

    /// Binary variables
    fn binary<F: FnMut(Self) -> VarId>(&self, model: &mut Formulation, id: F) -> Self::Out
    where
        Self: Sized,
    {
        self.vars(model, VarKind::Binary, &(0.0..1.0), id)
    }

    /// A continuous non-negative variable
    fn cont<F: FnMut(Self) -> VarId>(&self, model: &mut Formulation, id: F) -> Self::Out
    where
        Self: Sized,
    {
        self.vars(model, VarKind::Continuous, &(0.0..f64::INFINITY), id)
    }
}

impl AddVars for usize {
    type Out = Vec<Var>;

    fn vars_with<F: FnMut(Self) -> Var>(&self, func: F) -> Self::Out {
        (0..*self).map(func).collect()
    }
}

impl AddVars for (usize, usize) {
    type Out = Vec<<usize as AddVars>::Out>;

    fn vars_with<F: FnMut(Self) -> Var>(&self, mut func: F) -> Self::Out {
        let mut out = Vec::with_capacity(self.0);
        for i in 0..self.0 {
            out.push(self.1.vars_with(|j| func((i, j))));
        }
        out
    }
}

impl AddVars for (usize, usize, usize) {
    type Out = Vec<<(usize, usize) as AddVars>::Out>;

    fn vars_with<F: FnMut(Self) -> Var>(&self, mut func: F) -> Self::Out {
        let mut out = Vec::with_capacity(self.0);
        for i in 0..self.0 {
            out.push((self.1, self.2).vars_with(|(j, k)| func((i, j, k))));
        }
        out
    }
}

impl AddVars for (usize, usize, usize, usize) {
    type Out = Vec<<(usize, usize, usize) as AddVars>::Out>;

    fn vars_with<F: FnMut(Self) -> Var>(&self, mut func: F) -> Self::Out {
        let mut out = Vec::with_capacity(self.0);
        for i in 0..self.0 {
            out.push((self.1, self.2, self.3).vars_with(|(j, k, l)| func((i, j, k, l))));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Network, NodeIndex};

    #[test]
    fn nested_vectors_follow_the_domain_shape() {
        let network = Network::new(["A", "B", "C"], Vec::<(&str, &str)>::new()).unwrap();
        let mut model = Formulation::new("shape", network);

        let z = (3, 2, 1).binary(&mut model, |(n, t, _)| VarId::Deployment {
            node: NodeIndex::from(n),
            time: t,
            scenario: None,
        });

        assert_eq!(z.len(), 3);
        assert!(z.iter().all(|by_time| by_time.len() == 2));
        assert_eq!(model.vars().len(), 6);
        assert_eq!(model.var_name(z[2][1][0]), "z_C_1");
        assert_eq!(model.vars()[z[0][0][0]].bounds, 0.0..1.0);
    }
}
