/// An ordered collection of callbacks that all want to hear about the same values.
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use ribbit::listeners::Listeners;
///
/// let heard = Arc::new(Mutex::new(Vec::new()));
/// let mut ears = Listeners::<u8>::new();
///
/// let h = heard.clone();
/// ears.add(move |n| h.lock().unwrap().push(*n));
/// ears.notify(&3);
/// ears.notify(&4);
///
/// assert_eq!(*heard.lock().unwrap(), vec![3, 4]);
/// ```
pub struct Listeners<T> {
  ears: Vec<Box<dyn FnMut(&T) + Send>>,
}

impl<T> Default for Listeners<T> {
  fn default() -> Self {
    Self { ears: Vec::new() }
  }
}

impl<T> core::fmt::Debug for Listeners<T> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "Listeners({})", self.ears.len())
  }
}

impl<T> Listeners<T> {
  /// No listeners
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a callback; it will be invoked after every previously registered one
  pub fn add(&mut self, f: impl FnMut(&T) + Send + 'static) {
    self.ears.push(Box::new(f));
  }

  /// Invoke every callback, in registration order
  pub fn notify(&mut self, t: &T) {
    self.ears.iter_mut().for_each(|f| f(t));
  }

  /// Number of callbacks
  pub fn len(&self) -> usize {
    self.ears.len()
  }

  /// Are there no callbacks?
  pub fn is_empty(&self) -> bool {
    self.ears.is_empty()
  }

  /// Move every callback to the end of `other`, leaving `self` empty
  pub fn transfer_to(&mut self, other: &mut Listeners<T>) {
    other.ears.append(&mut self.ears);
  }
}
