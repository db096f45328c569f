/// Threshold expressions such as `p(99.9)<300` or `rate<0.001`.
use crate::error::ThresholdError;
use std::fmt;

/// Statistic computed over a metric's samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `(0, 100]`
    Percentile(f64),
    Rate,
    Count,
}

impl Aggregation {
    fn parse(text: &str, expression: &str) -> Result<Self, ThresholdError> {
        let err = |reason: String| ThresholdError::Parse {
            expression: expression.to_string(),
            reason,
        };
        match text {
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "med" => Ok(Self::Med),
            "rate" => Ok(Self::Rate),
            "count" => Ok(Self::Count),
            _ => {
                let inner = text
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| err(format!("unknown aggregation '{}'", text)))?;
                let p: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| err(format!("invalid percentile '{}'", inner)))?;
                if !(p > 0.0 && p <= 100.0) {
                    return Err(err(format!("percentile {} is outside (0, 100]", p)));
                }
                Ok(Self::Percentile(p))
            }
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => write!(f, "avg"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Med => write!(f, "med"),
            Self::Percentile(p) => write!(f, "p({})", p),
            Self::Rate => write!(f, "rate"),
            Self::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub fn compare(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
            Self::Eq => observed == bound,
            Self::Ne => observed != bound,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Parsed `<aggregation> <op> <number>` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub op: Operator,
    pub bound: f64,
    /// Expression as written in the configuration
    pub source: String,
}

impl ThresholdExpr {
    pub fn parse(expression: &str) -> Result<Self, ThresholdError> {
        let err = |reason: &str| ThresholdError::Parse {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = expression.trim();
        let op_start = trimmed
            .find(|c| matches!(c, '<' | '>' | '=' | '!'))
            .ok_or_else(|| err("missing comparison operator"))?;

        let (lhs, rest) = trimmed.split_at(op_start);
        // two-character operators first so `<=` is not read as `<`
        let (op, rhs) = [
            ("<=", Operator::Le),
            (">=", Operator::Ge),
            ("==", Operator::Eq),
            ("!=", Operator::Ne),
            ("<", Operator::Lt),
            (">", Operator::Gt),
        ]
        .iter()
        .find_map(|(symbol, op)| rest.strip_prefix(symbol).map(|rhs| (*op, rhs)))
        .ok_or_else(|| err("unknown comparison operator"))?;

        let lhs = lhs.trim();
        if lhs.is_empty() {
            return Err(err("missing aggregation"));
        }
        let aggregation = Aggregation::parse(lhs, expression)?;

        let rhs = rhs.trim();
        let bound: f64 = rhs
            .parse()
            .map_err(|_| err("bound is not a number"))?;
        if !bound.is_finite() {
            return Err(err("bound must be finite"));
        }

        Ok(Self {
            aggregation,
            op,
            bound,
            source: trimmed.to_string(),
        })
    }

    /// Whether an observed value satisfies the expression.
    pub fn holds(&self, observed: f64) -> bool {
        self.op.compare(observed, self.bound)
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.op, self.bound)
    }
}
