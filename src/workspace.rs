use std::any::Any;

/// Persistent scratch storage of a single worker.
///
/// Every worker slot owns one workspace for the lifetime of the pool, so that buffers allocated
/// during one dispatch are reused by the next. Objects are stored type-erased and looked up by
/// type. The workspace is optimized for the case where the same type is accessed many times in
/// a row.
#[derive(Debug, Default)]
pub struct Workspace {
    workspaces: Vec<Box<dyn Any>>,
}

impl Workspace {
    pub fn get_or_insert_with<W, F>(&mut self, create: F) -> &mut W
    where
        W: 'static,
        F: FnOnce() -> W,
    {
        // Note: We treat the Vec as a stack, so we search from the end of the vector.
        let existing_ws_idx = self.workspaces.iter().rposition(|ws| ws.is::<W>());
        let idx = match existing_ws_idx {
            Some(idx) => idx,
            None => {
                let w = create();
                self.workspaces.push(Box::new(w) as Box<dyn Any>);
                self.workspaces.len() - 1
            }
        };

        // Move the object to the top of the stack, so that the next lookup of the same type
        // finds it immediately
        let last = self.workspaces.len() - 1;
        self.workspaces.swap(idx, last);

        let entry = &mut self.workspaces[last];
        entry
            .downcast_mut()
            .expect("Internal error: Downcasting can by definition not fail")
    }

    pub fn get_or_default<W>(&mut self) -> &mut W
    where
        W: 'static + Default,
    {
        self.get_or_insert_with(Default::default)
    }

    /// A buffer of `len` elements for element-local work, reused across calls.
    ///
    /// The contents of the buffer are unspecified.
    pub fn element_buffer<T>(&mut self, len: usize, fill: T) -> &mut [T]
    where
        T: 'static + Clone,
    {
        let buffer: &mut Vec<T> = self.get_or_default();
        buffer.resize(len, fill);
        buffer.as_mut_slice()
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }
}
