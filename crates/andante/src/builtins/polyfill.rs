//! Startup polyfills: methods easier to express in the source dialect than
//! natively, because they call back into user code.
//!
//! The source is parsed with spans stripped and prepended to the program
//! body, so it runs to completion before user code and the driver steps
//! straight past it.

pub(crate) const SOURCE: &str = r"
Object.defineProperties = function(obj, props) {
  for (var key in props) {
    Object.defineProperty(obj, key, props[key]);
  }
  return obj;
};

Array.prototype.every = function(callback, thisArg) {
  for (var i = 0; i < this.length; i++) {
    if (i in this && !callback.call(thisArg, this[i], i, this)) {
      return false;
    }
  }
  return true;
};

Array.prototype.some = function(callback, thisArg) {
  for (var i = 0; i < this.length; i++) {
    if (i in this && callback.call(thisArg, this[i], i, this)) {
      return true;
    }
  }
  return false;
};

Array.prototype.forEach = function(callback, thisArg) {
  for (var i = 0; i < this.length; i++) {
    if (i in this) {
      callback.call(thisArg, this[i], i, this);
    }
  }
};

Array.prototype.map = function(callback, thisArg) {
  var result = new Array(this.length);
  for (var i = 0; i < this.length; i++) {
    if (i in this) {
      result[i] = callback.call(thisArg, this[i], i, this);
    }
  }
  return result;
};

Array.prototype.filter = function(callback, thisArg) {
  var result = [];
  for (var i = 0; i < this.length; i++) {
    if (i in this) {
      var value = this[i];
      if (callback.call(thisArg, value, i, this)) {
        result.push(value);
      }
    }
  }
  return result;
};

Array.prototype.reduce = function(callback, initialValue) {
  var index = 0;
  var accumulator;
  if (arguments.length > 1) {
    accumulator = initialValue;
  } else {
    while (index < this.length && !(index in this)) {
      index++;
    }
    if (index >= this.length) {
      throw new TypeError('Reduce of empty array with no initial value');
    }
    accumulator = this[index++];
  }
  for (; index < this.length; index++) {
    if (index in this) {
      accumulator = callback(accumulator, this[index], index, this);
    }
  }
  return accumulator;
};

Array.prototype.reduceRight = function(callback, initialValue) {
  var index = this.length - 1;
  var accumulator;
  if (arguments.length > 1) {
    accumulator = initialValue;
  } else {
    while (index >= 0 && !(index in this)) {
      index--;
    }
    if (index < 0) {
      throw new TypeError('Reduce of empty array with no initial value');
    }
    accumulator = this[index--];
  }
  for (; index >= 0; index--) {
    if (index in this) {
      accumulator = callback(accumulator, this[index], index, this);
    }
  }
  return accumulator;
};

Array.prototype.sort = function(comparator) {
  var compare = comparator || function(a, b) {
    if (a === undefined) {
      return b === undefined ? 0 : 1;
    }
    if (b === undefined) {
      return -1;
    }
    a = String(a);
    b = String(b);
    if (a < b) {
      return -1;
    }
    if (a > b) {
      return 1;
    }
    return 0;
  };
  for (var i = 1; i < this.length; i++) {
    var value = this[i];
    var j = i - 1;
    while (j >= 0 && compare(this[j], value) > 0) {
      this[j + 1] = this[j];
      j--;
    }
    this[j + 1] = value;
  }
  return this;
};

Array.prototype.toLocaleString = function() {
  var parts = [];
  for (var i = 0; i < this.length; i++) {
    var element = this[i];
    parts.push((element === null || element === undefined) ? '' : element.toLocaleString());
  }
  return parts.join(',');
};
";
