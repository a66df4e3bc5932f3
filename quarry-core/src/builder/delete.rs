//! Terminal deletes

use super::common::Identifier;
use super::Builder;
use crate::connection::{Connection, Driver};
use crate::{Result, Value};

impl Builder {
    /// Delete matching rows, returning how many went
    pub async fn delete<D: Driver>(&self, conn: &mut Connection<D>) -> Result<u64> {
        let sql = self.grammar.compile_delete(self)?;
        let bindings = self.grammar.prepare_bindings_for_delete(&self.bindings);
        conn.delete(&sql, &bindings).await
    }

    /// Delete the row whose `id` column (qualified by the table) equals `id`
    pub async fn delete_by_id<D, T>(&self, conn: &mut Connection<D>, id: T) -> Result<u64>
    where
        D: Driver,
        T: Into<Value>,
    {
        let column = match self.from.as_ref().and_then(Identifier::name) {
            Some(from) => format!("{}.id", from),
            None => "id".to_string(),
        };
        let mut query = self.clone();
        query.where_((column.as_str(), id.into()));
        query.delete(conn).await
    }

    /// Empty the table and reset its identity counter where the dialect keeps one
    pub async fn truncate<D: Driver>(&self, conn: &mut Connection<D>) -> Result<()> {
        for (sql, bindings) in self.grammar.compile_truncate(self)? {
            conn.statement(&sql, &bindings).await?;
        }
        Ok(())
    }
}
