use super::{
    check_pick_count, check_unique_names, operand_description, Constant, Guesses, IntoModel,
    Model, PREC_POWER, PREC_PRODUCT, PREC_SUM,
};
use crate::error::Result;
use crate::parameters::resolver::ParamValues;
use crate::parameters::Parameter;
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operator of a [`CombinedModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Pow => "**",
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => PREC_SUM,
            Operator::Mul | Operator::Div => PREC_PRODUCT,
            Operator::Pow => PREC_POWER,
        }
    }

    fn apply(&self, a: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
        match self {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
            Operator::Div => a / b,
            Operator::Pow => Zip::from(a).and(b).map_collect(|a, b| a.powf(*b)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Two models joined by an operator: `fcn(p, x) = op(a(p, x), b(p, x))`.
#[derive(Debug, Clone)]
pub struct CombinedModel {
    a: Box<dyn Model>,
    b: Box<dyn Model>,
    op: Operator,
    source: Option<String>,
}

impl CombinedModel {
    /// Combine two operands, rejecting a shared parameter name.
    pub fn new(a: impl IntoModel, b: impl IntoModel, op: Operator) -> Result<Self> {
        let a = a.into_model();
        let b = b.into_model();
        check_unique_names(a.params().into_iter().chain(b.params()))?;
        Ok(Self::join(a, b, op))
    }

    /// Combine operands known to have disjoint (or intentionally shared) names.
    pub(crate) fn join(a: Box<dyn Model>, b: Box<dyn Model>, op: Operator) -> Self {
        Self {
            a,
            b,
            op,
            source: None,
        }
    }

    pub fn left(&self) -> &dyn Model {
        self.a.as_ref()
    }

    pub fn right(&self) -> &dyn Model {
        self.b.as_ref()
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    /// Operands of the left-leaning chain of `self.op`, left to right.
    fn chain(&self) -> Vec<&dyn Model> {
        let mut operands = vec![self.b.as_ref()];
        let mut node = self.a.as_ref();
        while let Some(combined) = node.as_combined() {
            if combined.op != self.op {
                break;
            }
            operands.push(combined.b.as_ref());
            node = combined.a.as_ref();
        }
        operands.push(node);
        operands.reverse();
        operands
    }

    fn chain_components(&self) -> Vec<Box<dyn Model>> {
        let (modifiers, components): (Vec<&dyn Model>, Vec<&dyn Model>) =
            self.chain().into_iter().partition(|m| m.is_modifier());
        if components.is_empty() {
            return Vec::new();
        }

        let expanded = components.into_iter().flat_map(|c| c.get_components());
        let mut modifiers = modifiers.into_iter().map(|m| m.box_clone());
        let aggregate = modifiers
            .next()
            .map(|first| modifiers.fold(first, |acc, m| Box::new(Self::join(acc, m, self.op)) as Box<dyn Model>));

        match aggregate {
            Some(modifier) => expanded
                .map(|c| Box::new(Self::join(c, modifier.clone(), self.op)) as Box<dyn Model>)
                .collect(),
            None => expanded.collect(),
        }
    }

    fn difference_components(&self) -> Vec<Box<dyn Model>> {
        match (self.a.is_modifier(), self.b.is_modifier()) {
            (false, true) => self
                .a
                .get_components()
                .into_iter()
                .map(|c| Box::new(Self::join(c, self.b.clone(), Operator::Sub)) as Box<dyn Model>)
                .collect(),
            (true, false) => self
                .b
                .get_components()
                .into_iter()
                .map(|c| Box::new(Self::join(self.a.clone(), c, Operator::Sub)) as Box<dyn Model>)
                .collect(),
            (false, false) => {
                let mut components = self.a.get_components();
                components.extend(self.b.get_components().into_iter().map(|c| {
                    Box::new(Self::join(Box::new(Constant::new(-1.0)), c, Operator::Mul))
                        as Box<dyn Model>
                }));
                components
            }
            (true, true) => Vec::new(),
        }
    }

    fn quotient_components(&self) -> Vec<Box<dyn Model>> {
        if self.a.is_modifier() || !self.b.is_modifier() {
            return Vec::new();
        }
        self.a
            .get_components()
            .into_iter()
            .map(|c| Box::new(Self::join(c, self.b.clone(), Operator::Div)) as Box<dyn Model>)
            .collect()
    }
}

impl Model for CombinedModel {
    fn name(&self) -> &str {
        ""
    }

    fn params(&self) -> Vec<&Parameter> {
        let mut params = self.a.params();
        params.extend(self.b.params());
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.a.params_mut();
        params.extend(self.b.params_mut());
        params
    }

    fn eval(&self, values: &ParamValues, x: &Array1<f64>) -> Result<Array1<f64>> {
        let ya = self.a.eval(values, x)?;
        let yb = self.b.eval(values, x)?;
        Ok(self.op.apply(&ya, &yb))
    }

    fn is_modifier(&self) -> bool {
        self.a.is_modifier() && self.b.is_modifier()
    }

    fn pick_points(&self) -> Vec<String> {
        let mut points = self.a.pick_points();
        points.extend(self.b.pick_points());
        points
    }

    fn convert_pick(&self, points: &[(f64, f64)]) -> Result<Guesses> {
        check_pick_count(self.pick_points().len(), points)?;
        let (left, right) = points.split_at(self.a.pick_points().len());
        let mut guesses = self.a.convert_pick(left)?;
        guesses.extend(self.b.convert_pick(right)?);
        Ok(guesses)
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn set_source(&mut self, source: Option<String>) {
        self.source = source;
    }

    fn build_description(&self) -> String {
        let p = self.op.precedence();
        let (pa, pb) = (self.a.precedence(), self.b.precedence());
        let (left_parens, right_parens) = match self.op {
            Operator::Pow => (pa <= p, pb < p),
            Operator::Add | Operator::Mul => (pa < p, pb < p),
            Operator::Sub | Operator::Div => (pa < p, pb <= p),
        };
        format!(
            "{} {} {}",
            operand_description(self.a.as_ref(), left_parens),
            self.op,
            operand_description(self.b.as_ref(), right_parens)
        )
    }

    fn precedence(&self) -> u8 {
        self.op.precedence()
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }

    fn as_combined(&self) -> Option<&CombinedModel> {
        Some(self)
    }

    fn get_components(&self) -> Vec<Box<dyn Model>> {
        let components = match self.op {
            Operator::Add | Operator::Mul => self.chain_components(),
            Operator::Sub => self.difference_components(),
            Operator::Div => self.quotient_components(),
            Operator::Pow => Vec::new(),
        };
        if components.is_empty() {
            vec![self.box_clone()]
        } else {
            components
        }
    }
}

pub fn add(a: impl IntoModel, b: impl IntoModel) -> Result<CombinedModel> {
    CombinedModel::new(a, b, Operator::Add)
}

pub fn subtract(a: impl IntoModel, b: impl IntoModel) -> Result<CombinedModel> {
    CombinedModel::new(a, b, Operator::Sub)
}

pub fn multiply(a: impl IntoModel, b: impl IntoModel) -> Result<CombinedModel> {
    CombinedModel::new(a, b, Operator::Mul)
}

pub fn divide(a: impl IntoModel, b: impl IntoModel) -> Result<CombinedModel> {
    CombinedModel::new(a, b, Operator::Div)
}

pub fn power(a: impl IntoModel, b: impl IntoModel) -> Result<CombinedModel> {
    CombinedModel::new(a, b, Operator::Pow)
}
