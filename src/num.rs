use bytemuck::{Pod, Zeroable};
use half::f16;

/// A software-emulated narrow-precision float.
///
/// The value is stored as the IEEE binary16 encoding in the low 16 bits of an
/// `f32` bit pattern, matching the device-side layout produced by
/// `vstore_half` into a float-sized slot. All conversions route through the
/// canonical [`Custom::from_f32`] / [`Custom::to_f32`] pair so rounding is
/// identical regardless of the entry type.
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct Custom {
    d: f32,
}

unsafe impl Zeroable for Custom {}
unsafe impl Pod for Custom {}

impl Custom {
    /// Largest finite encodable value.
    pub const MAX: Self = Self {
        d: f32::from_bits(0x7bff),
    };
    /// Smallest positive normal encodable value.
    pub const MIN: Self = Self {
        d: f32::from_bits(0x0400),
    };

    /// Encode a native float. The single entry point for all conversions in.
    #[inline]
    pub fn from_f32(a: f32) -> Self {
        let d = f32::from_bits(f16::from_f32(a).to_bits() as u32);
        Self { d }
    }

    /// Decode to a native float. The single entry point for all conversions out.
    #[inline]
    pub fn to_f32(self) -> f32 {
        f16::from_bits(self.d.to_bits() as u16).to_f32()
    }

    /// Bit pattern of the decoded native float.
    #[inline]
    pub fn to_bits(self) -> u32 {
        self.to_f32().to_bits()
    }

    #[inline]
    pub fn exp(self) -> Self {
        Unary::Exp.apply(self)
    }

    #[inline]
    pub fn ln(self) -> Self {
        Unary::Ln.apply(self)
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        Unary::Sqrt.apply(self)
    }

    #[inline]
    pub fn round(self) -> Self {
        Unary::Round.apply(self)
    }

    /// Conditional in kernel terms: yields `b` if `cond`, else `a`.
    #[inline]
    pub fn select(a: impl Into<Self>, b: impl Into<Self>, cond: bool) -> Self {
        match cond {
            true => b.into(),
            false => a.into(),
        }
    }
}

impl From<f32> for Custom {
    #[inline]
    fn from(value: f32) -> Self {
        Self::from_f32(value)
    }
}

impl From<f64> for Custom {
    #[inline]
    fn from(value: f64) -> Self {
        Self::from_f32(value as f32)
    }
}

impl From<i32> for Custom {
    #[inline]
    fn from(value: i32) -> Self {
        Self::from_f32(value as f32)
    }
}

impl From<i64> for Custom {
    #[inline]
    fn from(value: i64) -> Self {
        Self::from_f32(value as f32)
    }
}

impl From<bool> for Custom {
    #[inline]
    fn from(value: bool) -> Self {
        Self::from_f32(value as u32 as f32)
    }
}

impl From<Custom> for f32 {
    #[inline]
    fn from(value: Custom) -> Self {
        value.to_f32()
    }
}

impl PartialEq for Custom {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Compare::Eq.eval(self.to_f32(), other.to_f32())
    }
}

impl PartialOrd for Custom {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.to_f32().partial_cmp(&other.to_f32())
    }
}

impl std::ops::Add for Custom {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Binary::Add.apply(self, rhs)
    }
}

impl std::ops::Sub for Custom {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Binary::Sub.apply(self, rhs)
    }
}

impl std::ops::Mul for Custom {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Binary::Mul.apply(self, rhs)
    }
}

impl std::ops::Mul<f32> for Custom {
    type Output = Self;

    /// Multiply by a native float without pre-rounding the right-hand side.
    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::from_f32(self.to_f32() * rhs)
    }
}

impl std::ops::Div for Custom {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        Binary::Div.apply(self, rhs)
    }
}

impl std::ops::Neg for Custom {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Unary::Neg.apply(self)
    }
}

/// Binary arithmetic over emulated values.
///
/// Each variant carries both the native computation ([`Binary::eval`]) and its
/// generated-source identity ([`Binary::name`], [`Binary::symbol`]); the
/// operator impls above and the device source renderer are driven from the
/// same description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binary {
    Add,
    Sub,
    Mul,
    Div,
}

impl Binary {
    pub const ALL: [Self; 4] = [Self::Add, Self::Sub, Self::Mul, Self::Div];

    /// Overload name in generated device source.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
        }
    }

    /// Infix operator in generated device source.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    #[inline]
    pub fn eval(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
        }
    }

    /// Decode, compute in native precision, re-encode.
    #[inline]
    pub fn apply(self, a: Custom, b: Custom) -> Custom {
        Custom::from_f32(self.eval(a.to_f32(), b.to_f32()))
    }
}

/// Unary operations over emulated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unary {
    Neg,
    Exp,
    Ln,
    Sqrt,
    Round,
}

impl Unary {
    pub const ALL: [Self; 5] = [Self::Neg, Self::Exp, Self::Ln, Self::Sqrt, Self::Round];

    /// Overload name in generated device source.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Exp => "native_exp",
            Self::Ln => "native_log",
            Self::Sqrt => "native_sqrt",
            Self::Round => "round",
        }
    }

    /// Native-float callee in the generated body, if any; `Neg` uses `-`.
    pub const fn callee(self) -> Option<&'static str> {
        match self {
            Self::Neg => None,
            Self::Exp => Some("native_exp"),
            Self::Ln => Some("native_log"),
            Self::Sqrt => Some("native_sqrt"),
            Self::Round => Some("round"),
        }
    }

    #[inline]
    pub fn eval(self, a: f32) -> f32 {
        match self {
            Self::Neg => -a,
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Sqrt => a.sqrt(),
            Self::Round => a.round(),
        }
    }

    #[inline]
    pub fn apply(self, a: Custom) -> Custom {
        Custom::from_f32(self.eval(a.to_f32()))
    }
}

/// Relational operations over emulated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compare {
    Lt,
    Gt,
    Eq,
}

impl Compare {
    pub const ALL: [Self; 3] = [Self::Lt, Self::Gt, Self::Eq];

    /// Overload name in generated device source.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Eq => "eq",
        }
    }

    /// Infix operator in generated device source.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Eq => "==",
        }
    }

    #[inline]
    pub fn eval(self, a: f32, b: f32) -> bool {
        match self {
            Self::Lt => a < b,
            Self::Gt => a > b,
            Self::Eq => a == b,
        }
    }

    #[inline]
    pub fn apply(self, a: Custom, b: Custom) -> bool {
        self.eval(a.to_f32(), b.to_f32())
    }
}

#[cfg(test)]
mod tests {
    use half::f16;

    use super::{Binary, Compare, Custom, Unary};

    #[test]
    fn test_round_trip_exact() {
        // every binary16-representable value survives encode/decode exactly
        for x in [0.0f32, -0.0, 1.0, -1.0, 0.5, 2.0, 65504.0, -65504.0] {
            assert_eq!(Custom::from_f32(x).to_f32(), x);
        }
        for x in [1i32, -7, 42, 255] {
            assert_eq!(Custom::from(x).to_f32(), x as f32);
        }
        for x in [1i64, -128, 1024] {
            assert_eq!(Custom::from(x).to_f32(), x as f32);
        }
        for x in [0.25f64, -3.0, 8.0] {
            assert_eq!(Custom::from(x).to_f32(), x as f32);
        }
        assert_eq!(Custom::from(true).to_f32(), 1.0);
        assert_eq!(Custom::from(false).to_f32(), 0.0);
    }

    #[test]
    fn test_round_trip_lossy() {
        // values outside the narrow encoding lose precision, never crash
        let x = Custom::from_f32(1.0e10);
        assert!(x.to_f32().is_infinite());
        let x = Custom::from_f32(0.1);
        assert!((x.to_f32() - 0.1).abs() <= f16::EPSILON.to_f32());
    }

    #[test]
    fn test_encode_idempotent() {
        for x in [0.1f32, std::f32::consts::PI, -2.75, 1.0e10, 1.0e-10] {
            let once = Custom::from_f32(x);
            let twice = Custom::from_f32(once.to_f32());
            assert_eq!(once.to_f32().to_bits(), twice.to_f32().to_bits());
        }
    }

    #[test]
    fn test_arithmetic_matches_pipeline() {
        let values = [0.0f32, 1.0, -1.5, 0.25, 3.0, -65504.0, 1.0e-3];
        for &a in &values {
            for &b in &values {
                let (x, y) = (Custom::from_f32(a), Custom::from_f32(b));
                for op in Binary::ALL {
                    let expected = Custom::from_f32(op.eval(x.to_f32(), y.to_f32()));
                    let actual = op.apply(x, y);
                    assert_eq!(actual.to_f32().to_bits(), expected.to_f32().to_bits());
                }
            }
        }
    }

    #[test]
    fn test_operators() {
        let a = Custom::from_f32(3.0);
        let b = Custom::from_f32(2.0);
        assert_eq!((a + b).to_f32(), 5.0);
        assert_eq!((a - b).to_f32(), 1.0);
        assert_eq!((a * b).to_f32(), 6.0);
        assert_eq!((a / b).to_f32(), 1.5);
        assert_eq!((-a).to_f32(), -3.0);
        assert_eq!((a * 0.5f32).to_f32(), 1.5);
    }

    #[test]
    fn test_special_values_propagate() {
        let inf = Custom::from_f32(f32::INFINITY);
        let nan = Custom::from_f32(f32::NAN);
        assert!((inf + inf).to_f32().is_infinite());
        assert!((inf - inf).to_f32().is_nan());
        assert!((nan * nan).to_f32().is_nan());
        let zero = Custom::from_f32(0.0);
        assert!((Custom::from_f32(1.0) / zero).to_f32().is_infinite());
    }

    #[test]
    fn test_unary() {
        assert_eq!(Custom::from_f32(4.0).sqrt().to_f32(), 2.0);
        assert_eq!(Custom::from_f32(0.0).exp().to_f32(), 1.0);
        assert_eq!(Custom::from_f32(1.0).ln().to_f32(), 0.0);
        assert_eq!(Custom::from_f32(2.5).round().to_f32(), 3.0);
        for op in Unary::ALL {
            let x = Custom::from_f32(0.75);
            let expected = Custom::from_f32(op.eval(x.to_f32()));
            assert_eq!(op.apply(x).to_f32().to_bits(), expected.to_f32().to_bits());
        }
    }

    #[test]
    fn test_compare() {
        let a = Custom::from_f32(1.0);
        let b = Custom::from_f32(2.0);
        assert!(a < b);
        assert!(b > a);
        assert!(a == Custom::from_f32(1.0));
        assert!(Compare::Lt.apply(a, b));
        assert!(!Compare::Eq.apply(a, b));
    }

    #[test]
    fn test_select() {
        let a = Custom::from_f32(1.0);
        let b = Custom::from_f32(2.0);
        assert_eq!(Custom::select(a, b, true).to_f32(), 2.0);
        assert_eq!(Custom::select(a, b, false).to_f32(), 1.0);
        // native-or-emulated operands
        assert_eq!(Custom::select(0.5f32, b, false).to_f32(), 0.5);
    }

    #[test]
    fn test_limits() {
        assert_eq!(Custom::MAX.to_f32(), f16::MAX.to_f32());
        assert_eq!(Custom::MIN.to_f32(), f16::MIN_POSITIVE.to_f32());
    }
}
