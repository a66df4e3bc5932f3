//! Bindings partitioned by the clause that produced them

use crate::Value;

/// Clause kinds, declared in the order their bindings are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Select,
    From,
    Join,
    Where,
    GroupBy,
    Having,
    Order,
    Union,
    UnionOrder,
}

impl BindingKind {
    pub const ALL: [BindingKind; 9] = [
        BindingKind::Select,
        BindingKind::From,
        BindingKind::Join,
        BindingKind::Where,
        BindingKind::GroupBy,
        BindingKind::Having,
        BindingKind::Order,
        BindingKind::Union,
        BindingKind::UnionOrder,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    parts: [Vec<Value>; 9],
}

impl Bindings {
    pub fn push(&mut self, kind: BindingKind, value: Value) {
        self.parts[kind.index()].push(value);
    }

    pub fn extend<I>(&mut self, kind: BindingKind, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.parts[kind.index()].extend(values);
    }

    pub fn get(&self, kind: BindingKind) -> &[Value] {
        &self.parts[kind.index()]
    }

    pub fn set(&mut self, kind: BindingKind, values: Vec<Value>) {
        self.parts[kind.index()] = values;
    }

    pub fn clear(&mut self, kind: BindingKind) {
        self.parts[kind.index()].clear();
    }

    /// Flatten the partitions in the given order
    pub fn flatten_in(&self, order: &[BindingKind]) -> Vec<Value> {
        order
            .iter()
            .flat_map(|kind| self.get(*kind).iter().cloned())
            .collect()
    }

    /// Flatten all partitions except the excluded kinds, in emission order
    pub fn flatten_except(&self, excluded: &[BindingKind]) -> Vec<Value> {
        BindingKind::ALL
            .iter()
            .filter(|kind| !excluded.contains(kind))
            .flat_map(|kind| self.get(*kind).iter().cloned())
            .collect()
    }

    pub fn flatten(&self) -> Vec<Value> {
        self.flatten_except(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_uses_clause_order_not_call_order() {
        let mut bindings = Bindings::default();
        bindings.push(BindingKind::Order, Value::from("o"));
        bindings.push(BindingKind::Where, Value::from("w"));
        bindings.push(BindingKind::Join, Value::from("j"));
        bindings.push(BindingKind::Select, Value::from("s"));
        assert_eq!(
            bindings.flatten(),
            vec![
                Value::from("s"),
                Value::from("j"),
                Value::from("w"),
                Value::from("o")
            ]
        );
        assert_eq!(
            bindings.flatten_except(&[BindingKind::Select, BindingKind::Join]),
            vec![Value::from("w"), Value::from("o")]
        );
    }
}
