use tracing::info;

/// Background jobs collected during startup and spawned together once the
/// shared state they need exists.
pub struct TaskRunner {
    tasks: Vec<(&'static str, Box<dyn FnOnce() + Send>)>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn add_task<F>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tasks.push((name, Box::new(task)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn start_all(self) {
        for (name, task) in self.tasks {
            info!(task = name, "starting background task");
            task();
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}
