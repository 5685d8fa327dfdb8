//! Jx9 filter expressions for collection queries.
//!
//! Expressions render to raw Jx9 source that runs inside the record filter
//! callback, where `$rec` is the record under test: `field("age").gt(30)`
//! renders `($rec.age > 30)`. [`Collection::fetch_where`] wraps the rendered
//! expression in an anonymous Jx9 function.
//!
//! [`Collection::fetch_where`]: crate::Collection::fetch_where

use std::fmt;

/// A Jx9 expression fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    raw: String,
}

/// Reference to a record field: `field("qty")` renders `$rec.qty`.
pub fn field(name: &str) -> Expr {
    Expr {
        raw: format!("$rec.{name}"),
    }
}

/// Types that render to a Jx9 operand: expressions themselves, strings
/// (quoted and escaped), integers, doubles and booleans.
pub trait ToJx9 {
    /// Render the operand as Jx9 source.
    fn to_jx9(&self) -> String;
}

impl ToJx9 for Expr {
    fn to_jx9(&self) -> String {
        self.raw.clone()
    }
}

impl ToJx9 for &str {
    fn to_jx9(&self) -> String {
        quote(self)
    }
}

impl ToJx9 for String {
    fn to_jx9(&self) -> String {
        quote(self)
    }
}

impl ToJx9 for i64 {
    fn to_jx9(&self) -> String {
        self.to_string()
    }
}

impl ToJx9 for i32 {
    fn to_jx9(&self) -> String {
        self.to_string()
    }
}

impl ToJx9 for f64 {
    fn to_jx9(&self) -> String {
        self.to_string()
    }
}

impl ToJx9 for bool {
    fn to_jx9(&self) -> String {
        self.to_string()
    }
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

impl Expr {
    /// Wrap an already-rendered Jx9 fragment. Escape hatch for operators
    /// the builder does not cover.
    pub fn raw_jx9(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The rendered Jx9 source.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn infix(self, op: &str, rhs: impl ToJx9) -> Expr {
        Expr {
            raw: format!("({} {} {})", self.raw, op, rhs.to_jx9()),
        }
    }

    fn prefix(self, op: &str) -> Expr {
        Expr {
            raw: format!("{op}{}", self.raw),
        }
    }

    fn postfix(self, op: &str) -> Expr {
        Expr {
            raw: format!("{}{op}", self.raw),
        }
    }

    // Comparison

    /// `(self == rhs)`
    pub fn eq(self, rhs: impl ToJx9) -> Expr {
        self.infix("==", rhs)
    }

    /// `(self != rhs)`
    pub fn ne(self, rhs: impl ToJx9) -> Expr {
        self.infix("!=", rhs)
    }

    /// `(self > rhs)`
    pub fn gt(self, rhs: impl ToJx9) -> Expr {
        self.infix(">", rhs)
    }

    /// `(self >= rhs)`
    pub fn ge(self, rhs: impl ToJx9) -> Expr {
        self.infix(">=", rhs)
    }

    /// `(self < rhs)`
    pub fn lt(self, rhs: impl ToJx9) -> Expr {
        self.infix("<", rhs)
    }

    /// `(self <= rhs)`
    pub fn le(self, rhs: impl ToJx9) -> Expr {
        self.infix("<=", rhs)
    }

    // Arithmetic

    /// `(self + rhs)`
    pub fn add(self, rhs: impl ToJx9) -> Expr {
        self.infix("+", rhs)
    }

    /// `(self - rhs)`
    pub fn sub(self, rhs: impl ToJx9) -> Expr {
        self.infix("-", rhs)
    }

    /// `(self * rhs)`
    pub fn mul(self, rhs: impl ToJx9) -> Expr {
        self.infix("*", rhs)
    }

    /// `(self / rhs)`
    pub fn div(self, rhs: impl ToJx9) -> Expr {
        self.infix("/", rhs)
    }

    /// Jx9 string concatenation: `(self .. rhs)`
    pub fn concat(self, rhs: impl ToJx9) -> Expr {
        self.infix("..", rhs)
    }

    /// Arithmetic negation: `-self`
    pub fn neg(self) -> Expr {
        self.prefix("-")
    }

    /// Pre-increment: `++self`
    pub fn incr(self) -> Expr {
        self.prefix("++")
    }

    /// Post-increment: `self++`
    pub fn incr_post(self) -> Expr {
        self.postfix("++")
    }

    /// Pre-decrement: `--self`
    pub fn decr(self) -> Expr {
        self.prefix("--")
    }

    /// Post-decrement: `self--`
    pub fn decr_post(self) -> Expr {
        self.postfix("--")
    }

    // Bitwise

    /// `(self & rhs)`
    pub fn bitand(self, rhs: impl ToJx9) -> Expr {
        self.infix("&", rhs)
    }

    /// `(self | rhs)`
    pub fn bitor(self, rhs: impl ToJx9) -> Expr {
        self.infix("|", rhs)
    }

    /// `(self ^ rhs)`
    pub fn bitxor(self, rhs: impl ToJx9) -> Expr {
        self.infix("^", rhs)
    }

    /// `(self << rhs)`
    pub fn shl(self, rhs: impl ToJx9) -> Expr {
        self.infix("<<", rhs)
    }

    /// `(self >> rhs)`
    pub fn shr(self, rhs: impl ToJx9) -> Expr {
        self.infix(">>", rhs)
    }

    /// Bitwise complement: `~self`
    pub fn bitnot(self) -> Expr {
        self.prefix("~")
    }

    // Logical

    /// `(self && rhs)`
    pub fn and(self, rhs: impl ToJx9) -> Expr {
        self.infix("&&", rhs)
    }

    /// `(self || rhs)`
    pub fn or(self, rhs: impl ToJx9) -> Expr {
        self.infix("||", rhs)
    }

    /// Logical negation: `!self`
    pub fn not(self) -> Expr {
        self.prefix("!")
    }

    // String helpers

    /// Substring test via `strpos`.
    pub fn contains(self, needle: &str) -> Expr {
        Expr {
            raw: format!("strpos({}, {})", self.raw, quote(needle)),
        }
    }

    /// Case-insensitive substring test via `stripos`.
    pub fn contains_ci(self, needle: &str) -> Expr {
        Expr {
            raw: format!("stripos({}, {})", self.raw, quote(needle)),
        }
    }

    /// String equality via `strcmp`.
    pub fn equals(self, other: &str) -> Expr {
        Expr {
            raw: format!("strcmp({}, {}) == 0", self.raw, quote(other)),
        }
    }

    /// Case-insensitive string equality via `strcasecmp`.
    pub fn equals_ci(self, other: &str) -> Expr {
        Expr {
            raw: format!("strcasecmp({}, {}) == 0", self.raw, quote(other)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_renders_record_path() {
        assert_eq!(field("id").raw(), "$rec.id");
        assert_eq!(field("price").raw(), "$rec.price");
    }

    #[test]
    fn arithmetic_operators() {
        assert_eq!(
            field("price").add(field("qty")).raw(),
            "($rec.price + $rec.qty)"
        );
        assert_eq!(field("price").sub(13).raw(), "($rec.price - 13)");
        assert_eq!(
            field("price").mul(field("qty")).raw(),
            "($rec.price * $rec.qty)"
        );
        assert_eq!(field("price").div(2).raw(), "($rec.price / 2)");
        assert_eq!(field("qty").neg().raw(), "-$rec.qty");
        assert_eq!(
            field("text").concat("two").raw(),
            "($rec.text .. \"two\")"
        );
    }

    #[test]
    fn bitwise_operators() {
        assert_eq!(field("flags").bitand(240).raw(), "($rec.flags & 240)");
        assert_eq!(field("flags").bitor(1).raw(), "($rec.flags | 1)");
        assert_eq!(field("flags").bitxor(3).raw(), "($rec.flags ^ 3)");
        assert_eq!(field("qty").shl(2).raw(), "($rec.qty << 2)");
        assert_eq!(field("qty").shr(2).raw(), "($rec.qty >> 2)");
        assert_eq!(field("flags").bitnot().raw(), "~$rec.flags");
    }

    #[test]
    fn increment_and_decrement() {
        assert_eq!(field("qty").incr().raw(), "++$rec.qty");
        assert_eq!(field("qty").incr_post().raw(), "$rec.qty++");
        assert_eq!(field("qty").decr().raw(), "--$rec.qty");
        assert_eq!(field("qty").decr_post().raw(), "$rec.qty--");
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(field("id").eq(4).raw(), "($rec.id == 4)");
        assert_eq!(field("id").ne(4).raw(), "($rec.id != 4)");
        assert_eq!(field("qty").gt(10).raw(), "($rec.qty > 10)");
        assert_eq!(field("qty").ge(10).raw(), "($rec.qty >= 10)");
        assert_eq!(field("qty").lt(10).raw(), "($rec.qty < 10)");
        assert_eq!(field("qty").le(10).raw(), "($rec.qty <= 10)");
    }

    #[test]
    fn logical_operators() {
        assert_eq!(
            field("id").eq(1).or(field("qty").gt(5)).raw(),
            "(($rec.id == 1) || ($rec.qty > 5))"
        );
        assert_eq!(
            field("a").eq(1).and(field("b").eq(2)).not().raw(),
            "!(($rec.a == 1) && ($rec.b == 2))"
        );
    }

    #[test]
    fn string_helpers() {
        assert_eq!(
            field("name").contains("name 1").raw(),
            "strpos($rec.name, \"name 1\")"
        );
        assert_eq!(
            field("name").contains_ci("name 1").raw(),
            "stripos($rec.name, \"name 1\")"
        );
        assert_eq!(
            field("name").equals("x").raw(),
            "strcmp($rec.name, \"x\") == 0"
        );
        assert_eq!(
            field("name").equals_ci("x").raw(),
            "strcasecmp($rec.name, \"x\") == 0"
        );
    }

    #[test]
    fn string_literals_are_escaped() {
        assert_eq!(
            field("name").eq("say \"hi\"").raw(),
            "($rec.name == \"say \\\"hi\\\"\")"
        );
        assert_eq!(field("path").eq("a\\b").raw(), "($rec.path == \"a\\\\b\")");
    }
}
